//! Infrastructure layer: event store, dispatch, projections, the reservation
//! ledger service, voucher hooks and configuration.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod hooks;
pub mod ledger;
pub mod projections;
pub mod read_model;

mod integration_tests;

pub use config::{AppConfig, AppConfigError, LedgerSettings, load_config};
pub use hooks::{HookError, ValidationReport, VoucherDocument, VoucherHooks, VoucherItem};
pub use ledger::{LedgerError, ReservationLedger, ReservationRequest, ReserveOutcome};
