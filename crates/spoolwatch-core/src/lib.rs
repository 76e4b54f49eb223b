//! # Spoolwatch Core
//!
//! Core types, errors, and utilities for Spoolwatch.
//! Provides the normalized printer domain model, the error taxonomy, and the
//! handler registry used to fan events out to downstream consumers.

pub mod data;
pub mod decode;
pub mod error;
pub mod event_bus;
pub mod types;

pub use data::{
    CompletionOutcome, CompletionRecord, FilamentConsumption, HmsAlert, JobInfo,
    LifecycleStatus, LinkConfig, LinkState, Progress, SlotHumidity, SlotUsage, Snapshot,
    Temperatures, TopicClass, DEFAULT_SPOOL_LENGTH_MM, MAX_SLOTS,
};

pub use decode::{DecodeRules, Sensor, FIXED_POINT_SCALE};

pub use error::{CommandError, ConnectionError, Error, ParseError, Result};

pub use event_bus::{DispatchReport, HandlerRegistry, RegistryConfig};

pub use types::{
    thread_safe, thread_safe_deque, thread_safe_none, thread_safe_rw, ThreadSafe,
    ThreadSafeDeque, ThreadSafeOption, ThreadSafeRw,
};
