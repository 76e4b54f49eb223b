//! Configuration for Spoolwatch
//!
//! Provides configuration file handling, defaults, and validation.
//! Supports TOML and JSON file formats; the default location is
//! `<platform config dir>/spoolwatch/config.toml`.
//!
//! Configuration is organized into logical sections:
//! - Logging (filter level, output format)
//! - Monitor tuning (cache and queue capacities)
//! - Decode thresholds for fixed-point temperatures
//! - Printers (one connection per entry)

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use spoolwatch_core::{DecodeRules, LinkConfig};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name under the platform config directory
pub const APP_DIR: &str = "spoolwatch";

/// Default config file name
pub const CONFIG_FILE: &str = "config.toml";

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Monitor tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Snapshots kept in the recent-status cache
    pub recent_snapshot_capacity: usize,
    /// Broadcast queue depth for async consumers
    pub handler_queue_capacity: usize,
    /// Messages buffered between the link and the pipeline
    pub inbound_queue_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            recent_snapshot_capacity: 32,
            handler_queue_capacity: 256,
            inbound_queue_capacity: 128,
        }
    }
}

/// One printer connection
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettings {
    /// Display name
    pub name: String,
    /// Hostname or IP address
    pub host: String,
    /// MQTT over TLS port
    pub port: u16,
    /// MQTT username
    pub username: String,
    /// Printer access code
    pub access_code: String,
    /// Printer serial
    pub serial: String,
    /// MQTT keepalive, seconds
    pub keepalive_secs: u64,
    /// Delay between reconnection attempts, seconds
    pub reconnect_interval_secs: u64,
    /// Attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Handshake timeout, seconds
    pub connect_timeout_secs: u64,
    /// Accept the printer's self-signed certificate
    pub accept_invalid_certs: bool,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: LinkConfig::DEFAULT_PORT,
            username: LinkConfig::DEFAULT_USERNAME.to_string(),
            access_code: String::new(),
            serial: String::new(),
            keepalive_secs: 30,
            reconnect_interval_secs: 5,
            max_reconnect_attempts: 10,
            connect_timeout_secs: 10,
            accept_invalid_certs: true,
        }
    }
}

// Keeps the access code out of logs
impl fmt::Debug for PrinterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrinterSettings")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("access_code", &"***")
            .field("serial", &self.serial)
            .field("keepalive_secs", &self.keepalive_secs)
            .field("reconnect_interval_secs", &self.reconnect_interval_secs)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

impl PrinterSettings {
    /// Name for display, falling back to the serial
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.serial
        } else {
            &self.name
        }
    }

    /// Link configuration for this printer
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            host: self.host.trim().to_string(),
            port: self.port,
            username: self.username.clone(),
            access_code: self.access_code.clone(),
            serial: self.serial.trim().to_string(),
            keepalive: Duration::from_secs(self.keepalive_secs),
            reconnect_interval: Duration::from_secs(self.reconnect_interval_secs),
            max_reconnect_attempts: self.max_reconnect_attempts,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }

    fn validate(&self, index: usize) -> ConfigResult<()> {
        let key = |field: &str| format!("printers[{}].{}", index, field);

        for (field, value) in [
            ("host", &self.host),
            ("serial", &self.serial),
            ("access_code", &self.access_code),
            ("username", &self.username),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingKey(key(field)));
            }
        }

        if self.port == 0 {
            return Err(ConfigError::ValueOutOfRange {
                key: key("port"),
                value: self.port.to_string(),
            });
        }
        if self.keepalive_secs < 5 {
            return Err(ConfigError::ValueOutOfRange {
                key: key("keepalive_secs"),
                value: self.keepalive_secs.to_string(),
            });
        }
        if self.connect_timeout_secs < 1 {
            return Err(ConfigError::ValueOutOfRange {
                key: key("connect_timeout_secs"),
                value: self.connect_timeout_secs.to_string(),
            });
        }

        Ok(())
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging
    pub logging: LoggingSettings,
    /// Monitor tuning
    pub monitor: MonitorSettings,
    /// Fixed-point decode thresholds
    pub decode: DecodeRules,
    /// Printers to monitor
    pub printers: Vec<PrinterSettings>,
}

/// File formats understood by [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Format::Toml),
            Some("json") => Ok(Format::Json),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no platform config directory".to_string())
            })
    }

    /// Load config from file (TOML or JSON, by extension)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = Format::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match format {
            Format::Toml => toml::from_str(&content)?,
            Format::Json => serde_json::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            printers = config.printers.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load from `path`, or from the default location when `None`
    pub fn load(path: Option<&Path>) -> SettingsResult<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_from_file(&Self::default_path()?),
        }
    }

    /// Save config to file (TOML or JSON, by extension)
    ///
    /// Parent directories are created as needed.
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let format = Format::from_path(path)?;

        let content = match format {
            Format::Toml => toml::to_string_pretty(self)?,
            Format::Json => serde_json::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.printers.is_empty() {
            return Err(ConfigError::NoPrinters);
        }

        let mut serials = HashSet::new();
        for (index, printer) in self.printers.iter().enumerate() {
            printer.validate(index)?;
            if !serials.insert(printer.serial.trim()) {
                return Err(ConfigError::DuplicateSerial(printer.serial.clone()));
            }
        }

        for (key, value) in [
            (
                "monitor.recent_snapshot_capacity",
                self.monitor.recent_snapshot_capacity,
            ),
            (
                "monitor.handler_queue_capacity",
                self.monitor.handler_queue_capacity,
            ),
            (
                "monitor.inbound_queue_capacity",
                self.monitor.inbound_queue_capacity,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::ValueOutOfRange {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }

        for (key, value) in [
            ("decode.nozzle_threshold", self.decode.nozzle_threshold),
            ("decode.bed_threshold", self.decode.bed_threshold),
            ("decode.chamber_threshold", self.decode.chamber_threshold),
            (
                "decode.default_spool_length_mm",
                self.decode.default_spool_length_mm,
            ),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::ValueOutOfRange {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }

        Ok(())
    }
}
