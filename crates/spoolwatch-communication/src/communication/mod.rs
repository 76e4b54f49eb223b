//! Transport layer
//!
//! The printer link is MQTT over TLS. [`Publisher`] is the seam the
//! command path depends on, so commands can be exercised without a broker.

pub mod mqtt;
pub mod tls;

use async_trait::async_trait;
use spoolwatch_core::{ConnectionError, TopicClass};

pub use mqtt::{InboundMessage, LinkManager};

/// Anything that can publish a payload to a topic
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Whether a session is currently established
    fn is_connected(&self) -> bool;

    /// Publish `payload` to `topic`
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ConnectionError>;
}

/// Topics derived from a device serial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    /// Device serial
    pub serial: String,
    /// Subscribe-only topics, one per [`TopicClass`]
    pub subscriptions: Vec<String>,
    /// Publish-only command topic
    pub request: String,
}

impl TopicSet {
    /// Build the topic set for a device
    pub fn for_serial(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            subscriptions: TopicClass::ALL
                .iter()
                .map(|class| format!("device/{}/{}", serial, class.suffix()))
                .collect(),
            request: format!("device/{}/request", serial),
        }
    }
}
