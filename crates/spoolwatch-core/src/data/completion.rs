//! Job completion records

use super::telemetry::JobInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionOutcome {
    /// Finished normally
    Completed,
    /// Stopped on a printer fault
    Failed,
    /// Stopped by the operator before finishing
    Cancelled,
}

impl fmt::Display for CompletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionOutcome::Completed => write!(f, "completed"),
            CompletionOutcome::Failed => write!(f, "failed"),
            CompletionOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Filament consumed (or expected to be consumed) from one slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentConsumption {
    /// Slot number, 1-4
    pub slot: u8,
    /// Weight in grams
    pub weight_grams: Option<f64>,
    /// Length in millimeters
    pub length_mm: Option<f64>,
}

/// One-time event describing how an active job ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Printer serial
    pub serial: String,
    /// Outcome
    pub outcome: CompletionOutcome,
    /// Job identity at the time of completion
    pub job: Option<JobInfo>,
    /// Elapsed print time in seconds, when reported
    pub duration_secs: Option<u64>,
    /// Slicer estimate per slot
    pub estimated_consumption: Vec<FilamentConsumption>,
    /// Measured consumption per slot
    pub actual_consumption: Vec<FilamentConsumption>,
    /// Layers printed
    pub layers_completed: u32,
    /// Layers in the job
    pub total_layers: u32,
    /// Progress at the moment of completion
    pub progress_percent: f64,
    /// Printer error code, for failed jobs
    pub error_code: Option<String>,
    /// Printer error message, for failed jobs
    pub error_message: Option<String>,
    /// Detection time
    pub detected_at: DateTime<Utc>,
}

impl CompletionRecord {
    /// Sum of measured weight across slots, grams
    pub fn total_actual_weight(&self) -> f64 {
        self.actual_consumption
            .iter()
            .filter_map(|c| c.weight_grams)
            .sum()
    }
}
