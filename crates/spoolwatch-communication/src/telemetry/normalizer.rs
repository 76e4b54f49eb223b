//! Telemetry normalization
//!
//! Each logical field has an ordered table of candidate paths. The first
//! candidate that resolves to a plausible value wins; when none does, the
//! field falls back to zero or `None`.

use super::ams::MaterialSystemExtractor;
use super::status;
use super::value::{any_present, first_match, integer, lookup, number, text};
use crate::router::RoutedMessage;
use chrono::Utc;
use serde_json::Value;
use spoolwatch_core::{
    DecodeRules, HmsAlert, JobInfo, LifecycleStatus, Progress, Sensor, Snapshot, Temperatures,
};
use tracing::{debug, trace};

/// Candidate paths for one temperature sensor
#[derive(Debug, Clone, Copy)]
pub struct TemperatureProbe {
    /// Name used in trace output
    pub name: &'static str,
    /// Decode threshold to apply
    pub sensor: Sensor,
    /// Candidate paths, highest priority first
    pub paths: &'static [&'static str],
}

/// Raw `nozzle_1`, which is the logical right nozzle
pub const RAW_NOZZLE_1: TemperatureProbe = TemperatureProbe {
    name: "nozzle_1",
    sensor: Sensor::Nozzle,
    paths: &[
        "print.nozzle_temper.nozzle_1",
        "print.nozzle_temper",
        "print.device.extruder.info.0.temp",
        "nozzle_temper.nozzle_1",
        "nozzle_temper",
        "temperatures.nozzle_1",
    ],
};

/// Raw `nozzle_2`, which is the logical left nozzle
pub const RAW_NOZZLE_2: TemperatureProbe = TemperatureProbe {
    name: "nozzle_2",
    sensor: Sensor::Nozzle,
    paths: &[
        "print.nozzle_temper.nozzle_2",
        "print.nozzle_temper_2",
        "print.device.extruder.info.1.temp",
        "nozzle_temper.nozzle_2",
        "nozzle_temper_2",
        "temperatures.nozzle_2",
    ],
};

/// Heated bed
pub const BED: TemperatureProbe = TemperatureProbe {
    name: "bed",
    sensor: Sensor::Bed,
    paths: &[
        "print.bed_temper",
        "print.device.bed.info.temp",
        "bed_temper",
        "temperatures.bed",
    ],
};

/// Chamber
pub const CHAMBER: TemperatureProbe = TemperatureProbe {
    name: "chamber",
    sensor: Sensor::Chamber,
    paths: &[
        "print.chamber_temper",
        "print.device.ctc.info.temp",
        "chamber_temper",
        "temperatures.chamber",
    ],
};

const RAW_NOZZLE_1_TARGET: TemperatureProbe = TemperatureProbe {
    name: "nozzle_1_target",
    sensor: Sensor::Nozzle,
    paths: &[
        "print.nozzle_target_temper.nozzle_1",
        "print.nozzle_target_temper",
        "nozzle_target_temper.nozzle_1",
        "nozzle_target_temper",
    ],
};

const RAW_NOZZLE_2_TARGET: TemperatureProbe = TemperatureProbe {
    name: "nozzle_2_target",
    sensor: Sensor::Nozzle,
    paths: &[
        "print.nozzle_target_temper.nozzle_2",
        "print.nozzle_target_temper_2",
        "nozzle_target_temper.nozzle_2",
        "nozzle_target_temper_2",
    ],
};

const BED_TARGET: TemperatureProbe = TemperatureProbe {
    name: "bed_target",
    sensor: Sensor::Bed,
    paths: &["print.bed_target_temper", "bed_target_temper"],
};

const PERCENT_PATHS: &[&str] = &[
    "print.mc_percent",
    "mc_percent",
    "print.progress",
    "progress",
    "percent",
];
const REMAINING_PATHS: &[&str] = &[
    "print.mc_remaining_time",
    "mc_remaining_time",
    "remaining_time",
];
const LAYER_PATHS: &[&str] = &["print.layer_num", "layer_num"];
const TOTAL_LAYER_PATHS: &[&str] = &["print.total_layer_num", "total_layer_num"];

const STATE_PATHS: &[&str] = &["print.gcode_state", "gcode_state", "state"];
const STAGE_PATHS: &[&str] = &[
    "print.mc_print_stage",
    "mc_print_stage",
    "print.stg_cur",
    "stg_cur",
];

const ERROR_CODE_PATHS: &[&str] = &["print.print_error", "print_error", "error_code"];
const ERROR_MESSAGE_PATHS: &[&str] = &[
    "print.fail_reason",
    "print.err_msg",
    "print.mc_err_msg",
    "error_message",
];

const FILENAME_PATHS: &[&str] = &["print.gcode_file", "gcode_file", "print.file", "filename"];
const JOB_NAME_PATHS: &[&str] = &["print.subtask_name", "subtask_name", "job_name"];
const TASK_ID_PATHS: &[&str] = &["print.task_id", "task_id", "print.job_id"];
const HMS_PATHS: &[&str] = &["print.hms", "hms"];

/// Field tables checked to decide whether a payload carries telemetry at all
const RECOGNIZED_TABLES: &[&[&str]] = &[
    RAW_NOZZLE_1.paths,
    RAW_NOZZLE_2.paths,
    BED.paths,
    CHAMBER.paths,
    PERCENT_PATHS,
    REMAINING_PATHS,
    LAYER_PATHS,
    TOTAL_LAYER_PATHS,
    STATE_PATHS,
    STAGE_PATHS,
    ERROR_CODE_PATHS,
    FILENAME_PATHS,
    JOB_NAME_PATHS,
    HMS_PATHS,
];

/// Progress fields present in one message
///
/// Absent fields stay `None` so a partial push can be layered over the
/// last known progress instead of resetting it to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReportedProgress {
    /// Completion percentage, 0-100
    pub percent: Option<f64>,
    /// Estimated remaining minutes
    pub remaining_minutes: Option<u32>,
    /// Current layer
    pub current_layer: Option<u32>,
    /// Total layers
    pub total_layers: Option<u32>,
}

impl ReportedProgress {
    /// Reported fields over `base`
    pub fn merge(&self, base: &Progress) -> Progress {
        Progress {
            percent: self.percent.unwrap_or(base.percent),
            remaining_minutes: self.remaining_minutes.unwrap_or(base.remaining_minutes),
            current_layer: self.current_layer.unwrap_or(base.current_layer),
            total_layers: self.total_layers.unwrap_or(base.total_layers),
        }
    }
}

/// A snapshot plus what this message actually reported
///
/// Partial pushes often carry only temperatures; their status is carried
/// over from the previous message and must not count as a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// The snapshot
    pub snapshot: Snapshot,
    /// The payload contained a state string or stage code
    pub status_reported: bool,
    /// Progress fields the payload contained
    pub progress: ReportedProgress,
}

/// Turns routed payloads into [`Snapshot`]s
#[derive(Debug, Clone)]
pub struct TelemetryNormalizer {
    rules: DecodeRules,
    materials: MaterialSystemExtractor,
}

impl Default for TelemetryNormalizer {
    fn default() -> Self {
        Self::new(DecodeRules::default())
    }
}

impl TelemetryNormalizer {
    /// Create a normalizer with the given decode rules
    pub fn new(rules: DecodeRules) -> Self {
        Self {
            materials: MaterialSystemExtractor::new(rules.default_spool_length_mm),
            rules,
        }
    }

    /// Decode rules in use
    pub fn rules(&self) -> &DecodeRules {
        &self.rules
    }

    /// Normalize one routed message
    ///
    /// `previous` is the device's last known status, used when the payload
    /// reports none. Returns `None` when no recognizable field is present.
    pub fn normalize(
        &self,
        message: &RoutedMessage,
        previous: Option<LifecycleStatus>,
    ) -> Option<Normalized> {
        let payload = &message.payload;
        let materials = self.materials.extract(payload);

        let recognized = RECOGNIZED_TABLES
            .iter()
            .any(|table| any_present(payload, table));
        if !recognized && materials.is_none() {
            debug!(topic = %message.topic, "No recognizable telemetry fields");
            return None;
        }

        let state = first_match(payload, STATE_PATHS, text).map(|(s, _)| s);
        let stage = first_match(payload, STAGE_PATHS, integer).map(|(s, _)| s);
        let derived = status::derive_status(state.as_deref(), stage)
            .or_else(|| state.as_ref().map(|_| LifecycleStatus::Idle));
        let status_reported = derived.is_some();
        let status = derived.or(previous).unwrap_or_default();

        let (material_usage, humidity) = match materials {
            Some(report) => (Some(report.usage), report.humidity),
            None => (None, Vec::new()),
        };

        let progress = Self::progress(payload);
        let snapshot = Snapshot {
            timestamp: Utc::now(),
            serial: message.serial.clone(),
            topic_class: message.class,
            temperatures: self.temperatures(payload),
            progress: progress.merge(&Progress::default()),
            status,
            detailed_status: status::detailed_status(state.as_deref(), stage),
            error_code: Self::error_code(payload),
            error_message: Self::error_message(payload),
            job: Self::job(payload, state),
            material_usage,
            humidity,
            hms: Self::hms(payload),
            completion: None,
        };

        Some(Normalized {
            snapshot,
            status_reported,
            progress,
        })
    }

    /// First plausible decoded reading for a probe
    pub fn temperature(&self, payload: &Value, probe: &TemperatureProbe) -> Option<f64> {
        first_match(payload, probe.paths, |value| {
            number(value).and_then(|raw| self.rules.decode_plausible(probe.sensor, raw))
        })
        .map(|(celsius, path)| {
            trace!(sensor = probe.name, path, celsius, "Temperature resolved");
            celsius
        })
    }

    /// Target readings may legitimately be zero (heater off)
    fn target(&self, payload: &Value, probe: &TemperatureProbe) -> Option<f64> {
        let limit = self.rules.threshold(probe.sensor);
        first_match(payload, probe.paths, |value| {
            number(value)
                .map(|raw| self.rules.decode(probe.sensor, raw))
                .filter(|t| (0.0..=limit).contains(t))
        })
        .map(|(celsius, _)| celsius)
    }

    fn temperatures(&self, payload: &Value) -> Temperatures {
        // The feed's nozzle labels are reversed relative to logical positions.
        Temperatures {
            left_nozzle: self.temperature(payload, &RAW_NOZZLE_2).unwrap_or(0.0),
            right_nozzle: self.temperature(payload, &RAW_NOZZLE_1).unwrap_or(0.0),
            bed: self.temperature(payload, &BED).unwrap_or(0.0),
            chamber: self.temperature(payload, &CHAMBER).unwrap_or(0.0),
            left_nozzle_target: self.target(payload, &RAW_NOZZLE_2_TARGET),
            right_nozzle_target: self.target(payload, &RAW_NOZZLE_1_TARGET),
            bed_target: self.target(payload, &BED_TARGET),
        }
    }

    fn progress(payload: &Value) -> ReportedProgress {
        let count = |paths: &[&'static str]| {
            first_match(payload, paths, |v| number(v).filter(|n| *n >= 0.0))
                .map(|(n, _)| n.round() as u32)
        };

        ReportedProgress {
            percent: first_match(payload, PERCENT_PATHS, |v| {
                number(v).filter(|p| (0.0..=100.0).contains(p))
            })
            .map(|(p, _)| p),
            remaining_minutes: count(REMAINING_PATHS),
            current_layer: count(LAYER_PATHS),
            total_layers: count(TOTAL_LAYER_PATHS),
        }
    }

    fn error_code(payload: &Value) -> Option<String> {
        first_match(payload, ERROR_CODE_PATHS, |v| {
            integer(v).filter(|code| *code != 0)
        })
        .map(|(code, _)| {
            let code = code as u32;
            format!("{:04X}_{:04X}", code >> 16, code & 0xFFFF)
        })
    }

    fn error_message(payload: &Value) -> Option<String> {
        first_match(payload, ERROR_MESSAGE_PATHS, |v| {
            text(v).filter(|msg| msg != "0")
        })
        .map(|(msg, _)| msg)
    }

    fn job(payload: &Value, raw_state: Option<String>) -> Option<JobInfo> {
        let field = |paths: &[&'static str]| {
            first_match(payload, paths, |v| text(v).filter(|s| s != "0")).map(|(s, _)| s)
        };

        let job = JobInfo {
            filename: field(FILENAME_PATHS),
            job_name: field(JOB_NAME_PATHS),
            task_id: field(TASK_ID_PATHS),
            raw_state,
        };
        (!job.is_empty()).then_some(job)
    }

    fn hms(payload: &Value) -> Vec<HmsAlert> {
        HMS_PATHS
            .iter()
            .find_map(|path| lookup(payload, path).and_then(Value::as_array))
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let attr = entry.get("attr").and_then(integer)?;
                        let code = entry.get("code").and_then(integer)?;
                        Some(HmsAlert {
                            attr: attr as u32,
                            code: code as u32,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
