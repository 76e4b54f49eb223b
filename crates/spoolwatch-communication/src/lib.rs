//! # Spoolwatch Communication
//!
//! Printer link and telemetry ingestion for Spoolwatch.
//! Manages the MQTT-over-TLS session to each printer, routes inbound
//! messages, normalizes vendor payloads into snapshots, detects job
//! completion, and translates operator commands into device envelopes.

pub mod commands;
pub mod communication;
pub mod monitor;
pub mod pipeline;
pub mod router;
pub mod telemetry;

pub use commands::{CommandTranslator, PrinterCommand};
pub use communication::{InboundMessage, LinkManager, Publisher, TopicSet};
pub use monitor::{MonitorConfig, PrinterMonitor};
pub use pipeline::{PipelineConfig, RawMessage, TelemetryPipeline};
pub use router::{MessageRouter, RoutedMessage};
pub use telemetry::{
    CompletionDetector, MaterialReport, MaterialSystemExtractor, Normalized, ReportedProgress,
    TelemetryNormalizer,
};
