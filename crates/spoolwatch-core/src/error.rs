//! Error handling for Spoolwatch
//!
//! Provides error types for each layer of the telemetry core:
//! - Connection errors (transport: connect, subscribe, publish, reconnect)
//! - Command errors (operator commands that could not be delivered)
//! - Parse errors (payloads that cannot be turned into a snapshot)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents errors raised by the MQTT transport while connecting to a
/// printer, maintaining the session, or moving messages across it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Link is not connected
    #[error("Not connected to {serial}")]
    NotConnected {
        /// Serial of the printer the operation targeted.
        serial: String,
    },

    /// Connection handshake did not complete in time
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Transport refused or dropped the connection attempt
    #[error("Failed to connect to {host}:{port}: {reason}")]
    FailedToConnect {
        /// Broker host.
        host: String,
        /// Broker port.
        port: u16,
        /// The reason the connection failed.
        reason: String,
    },

    /// Connection lost after being established
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Reconnection attempts exhausted
    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// Subscribing to a topic failed
    #[error("Subscribe to {topic} failed: {reason}")]
    SubscribeFailed {
        /// Topic that could not be subscribed.
        topic: String,
        /// The reason the subscription failed.
        reason: String,
    },

    /// Publishing a message failed
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed {
        /// Topic the message was destined for.
        topic: String,
        /// The reason the publish failed.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Command error type
///
/// Raised to the caller of `send_command`. Commands are never retried
/// internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// No active connection to publish on
    #[error("Cannot send '{command}': printer not connected")]
    NotConnected {
        /// The command that was attempted.
        command: String,
    },

    /// Command parameters could not be used
    #[error("Invalid parameters for '{command}': {reason}")]
    InvalidParameters {
        /// The command that was attempted.
        command: String,
        /// The reason the parameters were rejected.
        reason: String,
    },

    /// Envelope could not be serialized
    #[error("Failed to encode '{command}': {reason}")]
    Encode {
        /// The command that was attempted.
        command: String,
        /// The serializer message.
        reason: String,
    },

    /// Transport failed to publish the envelope
    #[error("Failed to publish '{command}': {source}")]
    Transport {
        /// The command that was attempted.
        command: String,
        /// Underlying transport error.
        #[source]
        source: ConnectionError,
    },
}

/// Parse error type
///
/// Never propagated past the message router; used to describe why a
/// message was dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Payload is not valid JSON
    #[error("Malformed JSON on {topic}: {reason}")]
    MalformedJson {
        /// Topic the payload arrived on.
        topic: String,
        /// The decoder message.
        reason: String,
    },

    /// Payload is valid JSON but not an object
    #[error("Expected a JSON object on {topic}")]
    NotAnObject {
        /// Topic the payload arrived on.
        topic: String,
    },

    /// Topic does not belong to any known topic class
    #[error("Unrecognized topic: {topic}")]
    UnknownTopic {
        /// The topic string.
        topic: String,
    },
}

/// Main error type for Spoolwatch
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Command error
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Parse error
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::ConnectionTimeout { .. })
        )
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a command error
    pub fn is_command_error(&self) -> bool {
        matches!(self, Error::Command(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
