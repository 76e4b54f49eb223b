//! Link configuration and connection state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Connection parameters for one printer
///
/// Immutable for the life of a connection. Credentials arrive already
/// decrypted.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Printer hostname or IP address
    pub host: String,
    /// MQTT over TLS port
    pub port: u16,
    /// MQTT username
    pub username: String,
    /// MQTT password (printer access code)
    pub access_code: String,
    /// Printer serial, used to derive topics
    pub serial: String,
    /// MQTT keepalive
    pub keepalive: Duration,
    /// Delay between reconnection attempts
    pub reconnect_interval: Duration,
    /// Attempts before the link gives up
    pub max_reconnect_attempts: u32,
    /// Upper bound on the initial handshake
    pub connect_timeout: Duration,
    /// Skip certificate verification (printers ship self-signed certificates)
    pub accept_invalid_certs: bool,
}

impl LinkConfig {
    /// Default MQTT over TLS port
    pub const DEFAULT_PORT: u16 = 8883;
    /// Default MQTT username
    pub const DEFAULT_USERNAME: &'static str = "bblp";

    /// Config with default tuning for the given printer
    pub fn new(
        host: impl Into<String>,
        access_code: impl Into<String>,
        serial: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            username: Self::DEFAULT_USERNAME.to_string(),
            access_code: access_code.into(),
            serial: serial.into(),
            keepalive: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            connect_timeout: Duration::from_secs(10),
            accept_invalid_certs: true,
        }
    }
}

// Keeps the access code out of logs
impl fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("access_code", &"***")
            .field("serial", &self.serial)
            .field("keepalive", &self.keepalive)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("connect_timeout", &self.connect_timeout)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Connection state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkState {
    /// No session
    #[default]
    Disconnected,
    /// Initial handshake in progress
    Connecting,
    /// Session established
    Connected,
    /// Session lost, retrying
    Reconnecting {
        /// Current attempt, starting at 1
        attempt: u32,
    },
    /// Retries exhausted; only an explicit reconnect recovers
    Failed {
        /// Attempts made
        attempts: u32,
    },
}

impl LinkState {
    /// Session is usable for publishing
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            LinkState::Failed { attempts } => write!(f, "failed after {} attempts", attempts),
        }
    }
}
