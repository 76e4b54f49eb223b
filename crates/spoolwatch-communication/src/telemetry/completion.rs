//! Job completion detection
//!
//! Keeps the last reported status per device and fires a
//! [`CompletionRecord`] on the edge from an active status (printing or
//! paused) to a terminal one. The stored status is overwritten on every
//! observation, so repeated terminal reports never fire twice.

use super::normalizer::Normalized;
use super::value::{first_match, integer, number};
use chrono::Utc;
use serde_json::Value;
use spoolwatch_core::{
    CompletionOutcome, CompletionRecord, FilamentConsumption, LifecycleStatus, Progress,
    Snapshot, MAX_SLOTS,
};
use std::collections::HashMap;
use tracing::{debug, info};

const DURATION_PATHS: &[&str] = &[
    "print.mc_print_time",
    "mc_print_time",
    "print.print_time",
    "print_time",
    "print.elapsed_time",
    "elapsed_time",
];
const ESTIMATED_PATHS: &[&str] = &[
    "estimatedFilament",
    "print.estimated_filament",
    "estimated_filament",
    "print.estimatedFilament",
];
const ACTUAL_PATHS: &[&str] = &[
    "actualFilament",
    "print.actual_filament",
    "actual_filament",
    "print.actualFilament",
];

/// Classify a status transition
///
/// Returns an outcome only for an active-to-terminal edge.
pub fn classify(
    previous: LifecycleStatus,
    current: LifecycleStatus,
    progress_percent: f64,
) -> Option<CompletionOutcome> {
    if !previous.is_active() || !current.is_terminal() {
        return None;
    }
    match current {
        LifecycleStatus::Completed => Some(CompletionOutcome::Completed),
        LifecycleStatus::Error => Some(CompletionOutcome::Failed),
        _ if progress_percent < 100.0 => Some(CompletionOutcome::Cancelled),
        _ => Some(CompletionOutcome::Completed),
    }
}

/// What the detector remembers about one device
#[derive(Debug, Clone, Copy, Default)]
struct DeviceHistory {
    status: Option<LifecycleStatus>,
    progress: Progress,
}

/// Per-device completion state machine
#[derive(Debug, Default)]
pub struct CompletionDetector {
    devices: HashMap<String, DeviceHistory>,
}

impl CompletionDetector {
    /// Create a detector with no device history
    pub fn new() -> Self {
        Self::default()
    }

    /// Last status recorded for a device
    pub fn previous_status(&self, serial: &str) -> Option<LifecycleStatus> {
        self.devices.get(serial).and_then(|device| device.status)
    }

    /// Last known progress for a device, accumulated over partial reports
    pub fn last_progress(&self, serial: &str) -> Option<Progress> {
        self.devices.get(serial).map(|device| device.progress)
    }

    /// Forget a device's history
    pub fn reset(&mut self, serial: &str) {
        self.devices.remove(serial);
    }

    /// Record a normalized message and return a completion record if it
    /// ends an active job
    ///
    /// Progress fields are accumulated from every message. Only messages
    /// that reported a status can change the stored status or fire.
    /// `payload` is the raw message; consumption fields are read from it.
    pub fn observe(&mut self, normalized: &Normalized, payload: &Value) -> Option<CompletionRecord> {
        let snapshot = &normalized.snapshot;
        let device = self.devices.entry(snapshot.serial.clone()).or_default();

        if !normalized.status_reported {
            device.progress = normalized.progress.merge(&device.progress);
            return None;
        }

        let previous = device.status.replace(snapshot.status);
        // A new job starts from zero, not from the last job's counters.
        let starting = snapshot.status.is_active() && !previous.is_some_and(|p| p.is_active());
        let base = if starting {
            Progress::default()
        } else {
            device.progress
        };
        device.progress = normalized.progress.merge(&base);
        let progress = device.progress;

        let previous = previous?;
        if previous != snapshot.status {
            debug!(
                serial = %snapshot.serial,
                from = %previous,
                to = %snapshot.status,
                "Lifecycle transition"
            );
        }

        let outcome = classify(previous, snapshot.status, progress.percent)?;
        let record = Self::build_record(outcome, snapshot, &progress, payload);

        info!(
            serial = %record.serial,
            outcome = %record.outcome,
            duration_secs = ?record.duration_secs,
            grams = record.total_actual_weight(),
            "Print job ended"
        );
        Some(record)
    }

    fn build_record(
        outcome: CompletionOutcome,
        snapshot: &Snapshot,
        progress: &Progress,
        payload: &Value,
    ) -> CompletionRecord {
        let duration_secs = first_match(payload, DURATION_PATHS, |v| {
            number(v).filter(|minutes| *minutes >= 0.0)
        })
        .map(|(minutes, _)| (minutes * 60.0).round() as u64);

        let estimated_consumption = first_match(payload, ESTIMATED_PATHS, consumption_list)
            .map(|(list, _)| list)
            .unwrap_or_default();

        let actual_consumption = first_match(payload, ACTUAL_PATHS, consumption_list)
            .map(|(list, _)| list)
            .unwrap_or_else(|| consumption_from_usage(snapshot));

        let failed = outcome == CompletionOutcome::Failed;

        CompletionRecord {
            serial: snapshot.serial.clone(),
            outcome,
            job: snapshot.job.clone(),
            duration_secs,
            estimated_consumption,
            actual_consumption,
            layers_completed: progress.current_layer,
            total_layers: progress.total_layers,
            progress_percent: progress.percent,
            error_code: snapshot.error_code.clone().filter(|_| failed),
            error_message: snapshot.error_message.clone().filter(|_| failed),
            detected_at: Utc::now(),
        }
    }
}

/// Parse `[{slot, weight?, length?}, ...]`, or a bare number for slot 1
fn consumption_list(value: &Value) -> Option<Vec<FilamentConsumption>> {
    if let Some(grams) = number(value) {
        return Some(vec![FilamentConsumption {
            slot: 1,
            weight_grams: Some(grams),
            length_mm: None,
        }]);
    }

    let entries = value.as_array()?;
    let list: Vec<FilamentConsumption> = entries
        .iter()
        .filter_map(|entry| {
            let slot = entry
                .get("slot")
                .and_then(integer)
                .and_then(|s| u8::try_from(s).ok())
                .filter(|s| (1..=MAX_SLOTS).contains(s))?;
            let weight_grams = ["weight", "weight_g", "grams"]
                .iter()
                .find_map(|key| entry.get(*key).and_then(number));
            let length_mm = ["length", "length_mm"]
                .iter()
                .find_map(|key| entry.get(*key).and_then(number));
            (weight_grams.is_some() || length_mm.is_some()).then_some(FilamentConsumption {
                slot,
                weight_grams,
                length_mm,
            })
        })
        .collect();

    (!list.is_empty()).then_some(list)
}

/// Fall back to the material system's used length per slot
fn consumption_from_usage(snapshot: &Snapshot) -> Vec<FilamentConsumption> {
    snapshot
        .material_usage
        .iter()
        .flatten()
        .filter(|usage| usage.used_length_mm > 0.0)
        .map(|usage| FilamentConsumption {
            slot: usage.slot,
            weight_grams: None,
            length_mm: Some(usage.used_length_mm),
        })
        .collect()
}
