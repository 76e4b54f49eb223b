//! Inbound telemetry pipeline
//!
//! Router, normalizer, and completion detector wired in sequence, plus the
//! caches and handler registries downstream consumers read from. One message
//! is processed at a time and snapshots are dispatched in arrival order.

use crate::router::MessageRouter;
use crate::telemetry::{CompletionDetector, TelemetryNormalizer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spoolwatch_core::{
    thread_safe, thread_safe_deque, thread_safe_none, CompletionRecord, DecodeRules,
    HandlerRegistry, LifecycleStatus, ParseError, RegistryConfig, Snapshot, ThreadSafe,
    ThreadSafeDeque, ThreadSafeOption,
};

/// The last message received, kept verbatim for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Topic
    pub topic: String,
    /// Payload, lossily decoded as UTF-8
    pub payload: String,
    /// Receive time
    pub received_at: DateTime<Utc>,
}

/// Capacities for the pipeline's caches and queues
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Snapshots kept in the recent-status cache
    pub recent_snapshot_capacity: usize,
    /// Broadcast queue depth for async consumers
    pub handler_queue_capacity: usize,
    /// Decode thresholds
    pub decode: DecodeRules,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recent_snapshot_capacity: 32,
            handler_queue_capacity: 256,
            decode: DecodeRules::default(),
        }
    }
}

/// Turns inbound messages into snapshots and completion records
pub struct TelemetryPipeline {
    router: MessageRouter,
    normalizer: TelemetryNormalizer,
    detector: ThreadSafe<CompletionDetector>,
    snapshots: HandlerRegistry<Snapshot>,
    completions: HandlerRegistry<CompletionRecord>,
    recent: ThreadSafeDeque<Snapshot>,
    recent_capacity: usize,
    last_raw: ThreadSafeOption<RawMessage>,
}

impl Default for TelemetryPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl TelemetryPipeline {
    /// Create a pipeline
    pub fn new(config: PipelineConfig) -> Self {
        let registry = RegistryConfig {
            channel_capacity: config.handler_queue_capacity,
        };
        Self {
            router: MessageRouter::new(),
            normalizer: TelemetryNormalizer::new(config.decode),
            detector: thread_safe(CompletionDetector::new()),
            snapshots: HandlerRegistry::with_config(registry.clone()),
            completions: HandlerRegistry::with_config(registry),
            recent: thread_safe_deque(config.recent_snapshot_capacity),
            recent_capacity: config.recent_snapshot_capacity.max(1),
            last_raw: thread_safe_none(),
        }
    }

    /// Process one inbound message
    ///
    /// Returns the dispatched snapshot, or `None` when the message was
    /// dropped. Never fails: malformed input is logged and discarded.
    pub fn process(&self, topic: &str, payload: &[u8]) -> Option<Snapshot> {
        *self.last_raw.lock() = Some(RawMessage {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            received_at: Utc::now(),
        });

        let routed = match self.router.route(topic, payload) {
            Ok(routed) => routed,
            Err(e @ ParseError::UnknownTopic { .. }) => {
                tracing::debug!(error = %e, "Ignoring message");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed message");
                return None;
            }
        };

        let (normalized, completion) = {
            let mut detector = self.detector.lock();
            let previous = detector.previous_status(&routed.serial);
            let normalized = self.normalizer.normalize(&routed, previous)?;
            let completion = detector.observe(&normalized, &routed.payload);
            (normalized, completion)
        };

        let snapshot = Snapshot {
            completion: completion.clone(),
            ..normalized.snapshot
        };
        tracing::trace!(
            serial = %snapshot.serial,
            class = %snapshot.topic_class,
            status = %snapshot.status,
            "Snapshot built"
        );

        {
            let mut recent = self.recent.lock();
            if recent.len() >= self.recent_capacity {
                recent.pop_front();
            }
            recent.push_back(snapshot.clone());
        }

        let report = self.snapshots.dispatch(&snapshot);
        if report.failed > 0 {
            tracing::warn!(failed = report.failed, "Snapshot handlers panicked");
        }
        if let Some(record) = completion {
            self.completions.dispatch(&record);
        }

        Some(snapshot)
    }

    /// Snapshot handler registry
    pub fn snapshots(&self) -> &HandlerRegistry<Snapshot> {
        &self.snapshots
    }

    /// Completion handler registry
    pub fn completions(&self) -> &HandlerRegistry<CompletionRecord> {
        &self.completions
    }

    /// Most recent snapshot
    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.recent.lock().back().cloned()
    }

    /// Recent snapshots, oldest first
    pub fn recent_snapshots(&self) -> Vec<Snapshot> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Last message received, whether or not it produced a snapshot
    pub fn last_raw_message(&self) -> Option<RawMessage> {
        self.last_raw.lock().clone()
    }

    /// Status the completion detector last recorded for a device
    pub fn previous_status(&self, serial: &str) -> Option<LifecycleStatus> {
        self.detector.lock().previous_status(serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TOPIC: &str = "device/01S00A/report";

    #[test]
    fn test_recent_cache_is_bounded() {
        let pipeline = TelemetryPipeline::new(PipelineConfig {
            recent_snapshot_capacity: 2,
            ..PipelineConfig::default()
        });
        for bed in [50, 55, 60] {
            let payload = format!(r#"{{"print":{{"bed_temper":{}}}}}"#, bed);
            pipeline.process(TOPIC, payload.as_bytes());
        }

        let recent = pipeline.recent_snapshots();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].temperatures.bed, 55.0);
        assert_eq!(pipeline.latest_snapshot().unwrap().temperatures.bed, 60.0);
    }

    #[test]
    fn test_raw_message_kept_even_when_dropped() {
        let pipeline = TelemetryPipeline::default();
        assert!(pipeline.process(TOPIC, b"{oops").is_none());

        let raw = pipeline.last_raw_message().unwrap();
        assert_eq!(raw.topic, TOPIC);
        assert_eq!(raw.payload, "{oops");
        assert!(pipeline.latest_snapshot().is_none());
    }

    #[test]
    fn test_handlers_see_snapshots_in_order() {
        let pipeline = TelemetryPipeline::default();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        pipeline
            .snapshots()
            .register("collector", move |s: &Snapshot| sink.lock().push(s.progress.percent));

        for percent in [10, 20, 30] {
            let payload = format!(r#"{{"print":{{"mc_percent":{}}}}}"#, percent);
            pipeline.process(TOPIC, payload.as_bytes());
        }
        assert_eq!(*seen.lock(), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_partial_push_does_not_end_job() {
        let pipeline = TelemetryPipeline::default();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        pipeline.completions().register("count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        pipeline.process(TOPIC, br#"{"print":{"gcode_state":"RUNNING"}}"#);
        let snap = pipeline
            .process(TOPIC, br#"{"print":{"bed_temper":60}}"#)
            .unwrap();
        assert_eq!(snap.status, LifecycleStatus::Printing);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(
            pipeline.previous_status("01S00A"),
            Some(LifecycleStatus::Printing)
        );
    }
}
