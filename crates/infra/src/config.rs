//! Configuration loading and representation.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `config/default.{toml,json,yaml}` (optional)
//! 3. `config/{APP_ENV}.{toml,json,yaml}` (optional)
//! 4. `STOCKHOLD__*` environment variables, `__` separating nested keys
//!    (e.g. `STOCKHOLD__LEDGER__MAX_CONFLICT_RETRIES=16`,
//!    `STOCKHOLD__RESERVATION__BYPASS_ROLES=Stock Manager,System Manager`)

use std::collections::HashMap;
use std::env;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use stockhold_observability::LogSettings;
use stockhold_reservations::ReservationSettings;

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
const ENV_PREFIX: &str = "STOCKHOLD";
const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 8;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),
}

/// Write-path tuning for the reservation ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Extra attempts after a lost compare-and-swap on a bucket stream.
    pub max_conflict_retries: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogSettings,
    pub reservation: ReservationSettings,
    pub ledger: LedgerSettings,
}

impl AppConfig {
    /// Parse a TOML document layered over the built-in defaults.
    pub fn from_toml(document: &str) -> Result<Self, AppConfigError> {
        Ok(defaults()?
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("log.level", "info")?
        .set_default("log.json", true)?
        .set_default("ledger.max_conflict_retries", DEFAULT_MAX_CONFLICT_RETRIES)
}

/// Environment source; `vars` replaces the process environment when given.
fn environment(vars: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("reservation.bypass_roles")
        .source(vars)
}

fn build(run_env: &str, vars: Option<HashMap<String, String>>) -> Result<AppConfig, AppConfigError> {
    let config = defaults()?
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(environment(vars))
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Load the application configuration for `APP_ENV` (default `development`).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!(environment = %run_env, "loading configuration");

    let config = build(&run_env, None)?;

    info!(
        reservations_enabled = config.reservation.enabled,
        max_conflict_retries = config.ledger.max_conflict_retries,
        "configuration loaded"
    );
    Ok(config)
}
