//! Tracing/logging setup shared by every stockhold process.

pub mod tracing;

pub use crate::tracing::LogSettings;

/// Initialize process-wide logging with default settings.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(&LogSettings::default());
}

/// Initialize process-wide logging from configured settings.
pub fn init_with(settings: &LogSettings) {
    tracing::init_with(settings);
}
