//! Per-printer monitor
//!
//! Facade over one [`LinkManager`], one [`TelemetryPipeline`], and one
//! [`CommandTranslator`]. This is the surface collaborators use: handler
//! registration, broadcast receivers, status queries, and commands.

use crate::commands::CommandTranslator;
use crate::communication::{InboundMessage, LinkManager};
use crate::pipeline::{PipelineConfig, RawMessage, TelemetryPipeline};
use serde_json::{Map, Value};
use spoolwatch_core::{
    thread_safe, thread_safe_none, CommandError, CompletionRecord, ConnectionError, DecodeRules,
    LinkConfig, LinkState, Snapshot, ThreadSafe, ThreadSafeOption,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Tuning for a monitor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Snapshots kept in the recent-status cache
    pub recent_snapshot_capacity: usize,
    /// Broadcast queue depth for async consumers
    pub handler_queue_capacity: usize,
    /// Messages buffered between the link and the pipeline
    pub inbound_queue_capacity: usize,
    /// Decode thresholds
    pub decode: DecodeRules,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            recent_snapshot_capacity: 32,
            handler_queue_capacity: 256,
            inbound_queue_capacity: 128,
            decode: DecodeRules::default(),
        }
    }
}

/// Telemetry and control for one printer
pub struct PrinterMonitor {
    link: Arc<LinkManager>,
    pipeline: Arc<TelemetryPipeline>,
    translator: CommandTranslator,
    inbound: ThreadSafe<Option<mpsc::Receiver<InboundMessage>>>,
    worker: ThreadSafeOption<JoinHandle<()>>,
}

impl PrinterMonitor {
    /// Create a monitor; nothing connects until [`start`](Self::start)
    pub fn new(link_config: LinkConfig, config: MonitorConfig) -> Self {
        let translator = CommandTranslator::new(&link_config.serial);
        let (link, inbound) = LinkManager::new(link_config, config.inbound_queue_capacity);
        let pipeline = TelemetryPipeline::new(PipelineConfig {
            recent_snapshot_capacity: config.recent_snapshot_capacity,
            handler_queue_capacity: config.handler_queue_capacity,
            decode: config.decode,
        });

        Self {
            link: Arc::new(link),
            pipeline: Arc::new(pipeline),
            translator,
            inbound: thread_safe(Some(inbound)),
            worker: thread_safe_none(),
        }
    }

    /// Printer serial
    pub fn serial(&self) -> &str {
        &self.link.config().serial
    }

    /// Connect, subscribe, and start processing messages
    ///
    /// Can be called again after [`stop`](Self::stop) or a failed link to
    /// reconnect; the processing task is only spawned once.
    pub async fn start(&self) -> Result<(), ConnectionError> {
        self.spawn_worker();
        self.link.connect().await?;
        self.link.subscribe_to_topics().await?;
        Ok(())
    }

    /// Disconnect; registered handlers and caches are kept
    pub async fn stop(&self) {
        self.link.disconnect().await;
    }

    fn spawn_worker(&self) {
        let Some(mut inbound) = self.inbound.lock().take() else {
            return;
        };
        let pipeline = self.pipeline.clone();
        let serial = self.serial().to_string();

        let handle = tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                pipeline.process(&message.topic, &message.payload);
            }
            tracing::debug!(serial = %serial, "Inbound channel closed");
        });
        *self.worker.lock() = Some(handle);
    }

    /// Register a snapshot handler; replaces any handler with the same id
    ///
    /// Handlers run inline on the processing task in registration order and
    /// must return quickly. Slow consumers should use
    /// [`snapshot_receiver`](Self::snapshot_receiver) instead.
    pub fn on_message<F>(&self, handler_id: impl Into<String>, handler: F) -> bool
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.pipeline.snapshots().register(handler_id, handler)
    }

    /// Remove a snapshot handler
    pub fn off_message(&self, handler_id: &str) -> bool {
        self.pipeline.snapshots().unregister(handler_id)
    }

    /// Register a completion handler
    pub fn on_completion<F>(&self, handler_id: impl Into<String>, handler: F) -> bool
    where
        F: Fn(&CompletionRecord) + Send + Sync + 'static,
    {
        self.pipeline.completions().register(handler_id, handler)
    }

    /// Remove a completion handler
    pub fn off_completion(&self, handler_id: &str) -> bool {
        self.pipeline.completions().unregister(handler_id)
    }

    /// Bounded queue of snapshots for async consumers
    pub fn snapshot_receiver(&self) -> broadcast::Receiver<Snapshot> {
        self.pipeline.snapshots().receiver()
    }

    /// Bounded queue of completion records for async consumers
    pub fn completion_receiver(&self) -> broadcast::Receiver<CompletionRecord> {
        self.pipeline.completions().receiver()
    }

    /// Current link state
    pub fn connection_status(&self) -> LinkState {
        self.link.status()
    }

    /// Last raw message, for diagnostics
    pub fn last_raw_message(&self) -> Option<RawMessage> {
        self.pipeline.last_raw_message()
    }

    /// Most recent snapshot
    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.pipeline.latest_snapshot()
    }

    /// Recent snapshots, oldest first
    pub fn recent_snapshots(&self) -> Vec<Snapshot> {
        self.pipeline.recent_snapshots()
    }

    /// Send an operator command; returns its sequence id
    pub async fn send_command(
        &self,
        name: &str,
        params: Map<String, Value>,
    ) -> Result<String, CommandError> {
        self.translator
            .send_command(self.link.as_ref(), name, params)
            .await
    }

    /// The underlying pipeline
    pub fn pipeline(&self) -> &Arc<TelemetryPipeline> {
        &self.pipeline
    }
}

impl Drop for PrinterMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}
