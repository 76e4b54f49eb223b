//! Telemetry parsing
//!
//! Everything that turns a routed JSON payload into normalized domain
//! values: temperature and progress extraction, lifecycle mapping, the
//! material-system block, and completion detection.

pub mod ams;
pub mod completion;
pub mod normalizer;
pub mod status;
pub mod value;

pub use ams::{MaterialReport, MaterialSystemExtractor};
pub use completion::{classify, CompletionDetector};
pub use normalizer::{Normalized, ReportedProgress, TelemetryNormalizer, TemperatureProbe};
