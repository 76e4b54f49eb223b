//! Normalized domain model
//!
//! This module provides:
//! - Lifecycle status vocabulary shared by every printer family
//! - Normalized telemetry snapshots (temperatures, progress, job identity)
//! - Material-system slot usage and humidity
//! - Completion records emitted once per finished job
//! - Link configuration and connection state

pub mod completion;
pub mod link;
pub mod material;
pub mod telemetry;

pub use completion::{CompletionOutcome, CompletionRecord, FilamentConsumption};
pub use link::{LinkConfig, LinkState};
pub use material::{SlotHumidity, SlotUsage, DEFAULT_SPOOL_LENGTH_MM, MAX_SLOTS};
pub use telemetry::{
    HmsAlert, JobInfo, LifecycleStatus, Progress, Snapshot, Temperatures, TopicClass,
};
