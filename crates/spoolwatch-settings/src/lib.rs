//! Spoolwatch Settings Crate
//!
//! Loads, validates, and saves the application configuration: logging,
//! monitor tuning, decode thresholds, and the list of printers to watch.

pub mod config;
pub mod error;

pub use config::{Config, LoggingSettings, MonitorSettings, PrinterSettings};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
