use async_trait::async_trait;
use serde_json::{json, Map, Value};
use spoolwatch_communication::{CommandTranslator, Publisher};
use spoolwatch_core::{CommandError, ConnectionError};
use std::sync::{Arc, Mutex};

// Mock publisher recording everything sent through it
struct MockPublisher {
    connected: bool,
    fail_with: Option<ConnectionError>,
    sent: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockPublisher {
    fn connected() -> Self {
        Self {
            connected: true,
            fail_with: None,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ConnectionError> {
        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }
        let value: Value = serde_json::from_slice(&payload).expect("publisher received JSON");
        self.sent.lock().unwrap().push((topic.to_string(), value));
        Ok(())
    }
}

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_pause_resume_stop_envelopes() {
    let publisher = MockPublisher::connected();
    let translator = CommandTranslator::new("01S00A");

    for name in ["pause", "resume", "stop"] {
        translator
            .send_command(&publisher, name, Map::new())
            .await
            .unwrap();
    }

    let sent = publisher.sent.lock().unwrap();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|(topic, _)| topic == "device/01S00A/request"));
    assert_eq!(
        sent[0].1,
        json!({ "print": { "sequence_id": "1", "command": "pause" } })
    );
    assert_eq!(sent[1].1["print"]["command"], "resume");
    assert_eq!(sent[2].1["print"]["sequence_id"], "3");
}

#[tokio::test]
async fn test_home_and_leveling_use_system_envelope() {
    let publisher = MockPublisher::connected();
    let translator = CommandTranslator::new("01S00A");

    translator
        .send_command(&publisher, "home", params(json!({ "axis": "x" })))
        .await
        .unwrap();
    translator
        .send_command(&publisher, "start_leveling", Map::new())
        .await
        .unwrap();

    let sent = publisher.sent.lock().unwrap();
    assert_eq!(sent[0].1["system"]["command"], "home");
    assert_eq!(sent[0].1["system"]["axis"], "x");
    assert_eq!(sent[1].1["system"]["command"], "calibration");
}

#[tokio::test]
async fn test_unknown_command_forwarded() {
    let publisher = MockPublisher::connected();
    let translator = CommandTranslator::new("01S00A");

    let seq = translator
        .send_command(
            &publisher,
            "camera",
            params(json!({ "command": "ipcam_record_set", "control": "enable" })),
        )
        .await
        .unwrap();

    assert!(seq.is_empty());
    let sent = publisher.sent.lock().unwrap();
    assert_eq!(
        sent[0].1,
        json!({ "camera": { "command": "ipcam_record_set", "control": "enable" } })
    );
}

#[tokio::test]
async fn test_requires_connection() {
    let mut publisher = MockPublisher::connected();
    publisher.connected = false;
    let translator = CommandTranslator::new("01S00A");

    let err = translator
        .send_command(&publisher, "pause", Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NotConnected { .. }));
    assert!(publisher.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_publish_failure_surfaces_without_retry() {
    let mut publisher = MockPublisher::connected();
    publisher.fail_with = Some(ConnectionError::PublishFailed {
        topic: "device/01S00A/request".to_string(),
        reason: "request channel closed".to_string(),
    });
    let translator = CommandTranslator::new("01S00A");

    let err = translator
        .send_command(&publisher, "stop", Map::new())
        .await
        .unwrap_err();

    match err {
        CommandError::Transport { command, source } => {
            assert_eq!(command, "stop");
            assert!(matches!(source, ConnectionError::PublishFailed { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
