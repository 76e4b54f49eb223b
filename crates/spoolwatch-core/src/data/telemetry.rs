//! Normalized telemetry snapshot types

use super::completion::CompletionRecord;
use super::material::{SlotHumidity, SlotUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized printer lifecycle status
///
/// A closed vocabulary every vendor state string and stage code maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    /// Nothing running
    #[default]
    Idle,
    /// Job running
    Printing,
    /// Job paused by user or by the printer
    Paused,
    /// Job stopped on a fault
    Error,
    /// Job finished
    Completed,
    /// Homing the toolhead
    Homing,
    /// Bed leveling or calibration
    Leveling,
    /// Heating bed or nozzle
    Heating,
    /// Cooling down
    Cooling,
}

impl LifecycleStatus {
    /// A job is in flight (printing or paused)
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleStatus::Printing | LifecycleStatus::Paused)
    }

    /// Status that can end a job when reached from an active status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleStatus::Completed | LifecycleStatus::Error | LifecycleStatus::Idle
        )
    }

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Idle => "idle",
            LifecycleStatus::Printing => "printing",
            LifecycleStatus::Paused => "paused",
            LifecycleStatus::Error => "error",
            LifecycleStatus::Completed => "completed",
            LifecycleStatus::Homing => "homing",
            LifecycleStatus::Leveling => "leveling",
            LifecycleStatus::Heating => "heating",
            LifecycleStatus::Cooling => "cooling",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of a subscribed topic, derived from its last path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicClass {
    /// Full or incremental device report
    Report,
    /// Lightweight status push
    Status,
    /// Progress-only push
    Progress,
    /// Material-system push
    Ams,
}

impl TopicClass {
    /// All subscribed classes, in subscription order
    pub const ALL: [TopicClass; 4] = [
        TopicClass::Report,
        TopicClass::Status,
        TopicClass::Progress,
        TopicClass::Ams,
    ];

    /// Topic suffix for this class
    pub fn suffix(&self) -> &'static str {
        match self {
            TopicClass::Report => "report",
            TopicClass::Status => "status",
            TopicClass::Progress => "progress",
            TopicClass::Ams => "ams",
        }
    }

    /// Classify a topic by its final segment
    pub fn from_topic(topic: &str) -> Option<Self> {
        let suffix = topic.rsplit('/').next()?;
        Self::ALL.into_iter().find(|class| class.suffix() == suffix)
    }
}

impl fmt::Display for TopicClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Temperatures in whole degrees Celsius
///
/// `left_nozzle` and `right_nozzle` are logical positions; the raw feed
/// labels them the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Temperatures {
    /// Logical left nozzle (raw `nozzle_2`)
    pub left_nozzle: f64,
    /// Logical right nozzle (raw `nozzle_1`)
    pub right_nozzle: f64,
    /// Heated bed
    pub bed: f64,
    /// Chamber
    pub chamber: f64,
    /// Left nozzle target, when reported
    pub left_nozzle_target: Option<f64>,
    /// Right nozzle target, when reported
    pub right_nozzle_target: Option<f64>,
    /// Bed target, when reported
    pub bed_target: Option<f64>,
}

/// Print progress
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    /// Completion percentage, 0-100
    pub percent: f64,
    /// Estimated remaining time in minutes
    pub remaining_minutes: u32,
    /// Current layer
    pub current_layer: u32,
    /// Total layers
    pub total_layers: u32,
}

/// Identity of the job currently on the printer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobInfo {
    /// G-code or 3MF file name
    pub filename: Option<String>,
    /// Human job name (subtask)
    pub job_name: Option<String>,
    /// Vendor task identifier
    pub task_id: Option<String>,
    /// Raw vendor state string, as reported
    pub raw_state: Option<String>,
}

impl JobInfo {
    /// True when no identifying field is set
    pub fn is_empty(&self) -> bool {
        self.filename.is_none()
            && self.job_name.is_none()
            && self.task_id.is_none()
            && self.raw_state.is_none()
    }
}

/// Health-management alert reported by the printer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmsAlert {
    /// Module/severity attribute word
    pub attr: u32,
    /// Error code word
    pub code: u32,
}

impl HmsAlert {
    /// Formatted as four 16-bit hex groups, `XXXX_XXXX_XXXX_XXXX`
    pub fn formatted_code(&self) -> String {
        format!(
            "{:04X}_{:04X}_{:04X}_{:04X}",
            self.attr >> 16,
            self.attr & 0xFFFF,
            self.code >> 16,
            self.code & 0xFFFF
        )
    }
}

/// One normalized telemetry reading
///
/// Built once per inbound message and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the message was normalized
    pub timestamp: DateTime<Utc>,
    /// Printer serial
    pub serial: String,
    /// Topic class the message arrived on
    pub topic_class: TopicClass,
    /// Temperatures
    pub temperatures: Temperatures,
    /// Progress
    pub progress: Progress,
    /// Normalized lifecycle status
    pub status: LifecycleStatus,
    /// Human-readable status detail
    pub detailed_status: Option<String>,
    /// Printer error code, `XXXX_XXXX`
    pub error_code: Option<String>,
    /// Printer error message
    pub error_message: Option<String>,
    /// Current job, when any identifying field is present
    pub job: Option<JobInfo>,
    /// Per-slot material usage, when the material system reported
    pub material_usage: Option<Vec<SlotUsage>>,
    /// Per-slot humidity
    pub humidity: Vec<SlotHumidity>,
    /// Active health alerts
    pub hms: Vec<HmsAlert>,
    /// Completion record, when this message ended a job
    pub completion: Option<CompletionRecord>,
}

impl Snapshot {
    /// Slot currently feeding the toolhead, if known
    pub fn active_slot(&self) -> Option<u8> {
        self.material_usage
            .as_ref()?
            .iter()
            .find(|usage| usage.active)
            .map(|usage| usage.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_and_terminal_sets() {
        assert!(LifecycleStatus::Printing.is_active());
        assert!(LifecycleStatus::Paused.is_active());
        assert!(!LifecycleStatus::Heating.is_active());

        assert!(LifecycleStatus::Completed.is_terminal());
        assert!(LifecycleStatus::Error.is_terminal());
        assert!(LifecycleStatus::Idle.is_terminal());
        assert!(!LifecycleStatus::Cooling.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&LifecycleStatus::Leveling).unwrap();
        assert_eq!(json, "\"leveling\"");
        assert_eq!(LifecycleStatus::Homing.to_string(), "homing");
    }

    #[test]
    fn test_topic_class_from_topic() {
        assert_eq!(
            TopicClass::from_topic("device/01S00A/report"),
            Some(TopicClass::Report)
        );
        assert_eq!(
            TopicClass::from_topic("device/01S00A/ams"),
            Some(TopicClass::Ams)
        );
        assert_eq!(TopicClass::from_topic("device/01S00A/request"), None);
        assert_eq!(TopicClass::from_topic(""), None);
    }

    #[test]
    fn test_hms_code_formatting() {
        let alert = HmsAlert {
            attr: 0x0300_1200,
            code: 0x0002_0001,
        };
        assert_eq!(alert.formatted_code(), "0300_1200_0002_0001");
    }
}
