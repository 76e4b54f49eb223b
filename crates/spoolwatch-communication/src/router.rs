//! Message routing
//!
//! Splits `device/{serial}/{class}` topics and decodes the payload into a
//! JSON object. Anything that is not a JSON object on a known topic is
//! rejected with a [`ParseError`]; callers log and drop it.

use serde_json::Value;
use spoolwatch_core::{ParseError, TopicClass};

/// Topic prefix shared by every device topic
pub const TOPIC_PREFIX: &str = "device";

/// A payload ready for the normalizer
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedMessage {
    /// Full topic the message arrived on
    pub topic: String,
    /// Topic class from the final segment
    pub class: TopicClass,
    /// Device serial from the topic
    pub serial: String,
    /// Decoded JSON object
    pub payload: Value,
}

/// Stateless router for inbound messages
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageRouter;

impl MessageRouter {
    /// Create a router
    pub fn new() -> Self {
        Self
    }

    /// Classify the topic and decode the payload
    pub fn route(&self, topic: &str, payload: &[u8]) -> Result<RoutedMessage, ParseError> {
        let (serial, class) = Self::split_topic(topic).ok_or_else(|| ParseError::UnknownTopic {
            topic: topic.to_string(),
        })?;

        let value: Value =
            serde_json::from_slice(payload).map_err(|e| ParseError::MalformedJson {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        if !value.is_object() {
            return Err(ParseError::NotAnObject {
                topic: topic.to_string(),
            });
        }

        Ok(RoutedMessage {
            topic: topic.to_string(),
            class,
            serial: serial.to_string(),
            payload: value,
        })
    }

    /// `device/{serial}/{class}` -> `(serial, class)`
    pub fn split_topic(topic: &str) -> Option<(&str, TopicClass)> {
        let mut parts = topic.split('/');
        let prefix = parts.next()?;
        let serial = parts.next()?;
        let suffix = parts.next()?;
        if prefix != TOPIC_PREFIX || serial.is_empty() || parts.next().is_some() {
            return None;
        }
        let class = TopicClass::from_topic(suffix)?;
        Some((serial, class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_each_topic_class() {
        let router = MessageRouter::new();
        for class in TopicClass::ALL {
            let topic = format!("device/01S00A/{}", class.suffix());
            let routed = router.route(&topic, br#"{"print":{}}"#).unwrap();
            assert_eq!(routed.class, class);
            assert_eq!(routed.serial, "01S00A");
        }
    }

    #[test]
    fn test_malformed_payloads() {
        let router = MessageRouter::new();
        assert!(matches!(
            router.route("device/X/report", b"{not json"),
            Err(ParseError::MalformedJson { .. })
        ));
        assert!(matches!(
            router.route("device/X/report", b"[1,2,3]"),
            Err(ParseError::NotAnObject { .. })
        ));
        assert!(matches!(
            router.route("device/X/report", &[0xff, 0xfe]),
            Err(ParseError::MalformedJson { .. })
        ));
    }

    #[test]
    fn test_unknown_topics() {
        let router = MessageRouter::new();
        for topic in [
            "device/X/request",
            "device//report",
            "printer/X/report",
            "device/X/report/extra",
            "device/X",
        ] {
            assert!(
                matches!(router.route(topic, b"{}"), Err(ParseError::UnknownTopic { .. })),
                "{topic} should be rejected"
            );
        }
    }
}
