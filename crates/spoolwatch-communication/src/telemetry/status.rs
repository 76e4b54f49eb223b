//! Lifecycle status mapping
//!
//! Maps the vendor's `gcode_state` string and numeric print-stage code onto
//! [`LifecycleStatus`]. The state string wins; the stage code is a fallback
//! for reports that omit the string.

use spoolwatch_core::LifecycleStatus;

/// Substring rule for the vendor state string
#[derive(Debug, Clone, Copy)]
struct StateRule {
    needles: &'static [&'static str],
    status: LifecycleStatus,
    phrase: &'static str,
}

/// Checked top to bottom; the first rule with a matching needle wins
const STATE_RULES: &[StateRule] = &[
    StateRule {
        needles: &["finish", "complete"],
        status: LifecycleStatus::Completed,
        phrase: "Print finished",
    },
    StateRule {
        needles: &["homing"],
        status: LifecycleStatus::Homing,
        phrase: "Homing toolhead",
    },
    StateRule {
        needles: &["level", "calibrat"],
        status: LifecycleStatus::Leveling,
        phrase: "Auto bed leveling",
    },
    StateRule {
        needles: &["heat"],
        status: LifecycleStatus::Heating,
        phrase: "Heating",
    },
    StateRule {
        needles: &["cool"],
        status: LifecycleStatus::Cooling,
        phrase: "Cooling down",
    },
    StateRule {
        needles: &["pause"],
        status: LifecycleStatus::Paused,
        phrase: "Paused",
    },
    StateRule {
        needles: &["error", "fail"],
        status: LifecycleStatus::Error,
        phrase: "Print failed",
    },
    StateRule {
        needles: &["prepare"],
        status: LifecycleStatus::Printing,
        phrase: "Preparing",
    },
    StateRule {
        needles: &["slicing"],
        status: LifecycleStatus::Printing,
        phrase: "Slicing",
    },
    StateRule {
        needles: &["print", "running"],
        status: LifecycleStatus::Printing,
        phrase: "Printing",
    },
    StateRule {
        needles: &["idle"],
        status: LifecycleStatus::Idle,
        phrase: "Idle",
    },
];

/// Stage codes with a status other than `Printing`
const STAGE_STATUS: &[(i64, LifecycleStatus)] = &[
    (-1, LifecycleStatus::Idle),
    (255, LifecycleStatus::Idle),
    (1, LifecycleStatus::Leveling),
    (8, LifecycleStatus::Leveling),
    (9, LifecycleStatus::Leveling),
    (12, LifecycleStatus::Leveling),
    (18, LifecycleStatus::Leveling),
    (19, LifecycleStatus::Leveling),
    (25, LifecycleStatus::Leveling),
    (2, LifecycleStatus::Heating),
    (7, LifecycleStatus::Heating),
    (15, LifecycleStatus::Heating),
    (13, LifecycleStatus::Homing),
    (5, LifecycleStatus::Paused),
    (6, LifecycleStatus::Paused),
    (16, LifecycleStatus::Paused),
    (17, LifecycleStatus::Paused),
    (20, LifecycleStatus::Paused),
    (21, LifecycleStatus::Paused),
    (23, LifecycleStatus::Paused),
    (26, LifecycleStatus::Paused),
    (27, LifecycleStatus::Paused),
    (28, LifecycleStatus::Paused),
    (30, LifecycleStatus::Paused),
    (32, LifecycleStatus::Paused),
    (33, LifecycleStatus::Paused),
    (34, LifecycleStatus::Paused),
    (35, LifecycleStatus::Paused),
    (29, LifecycleStatus::Cooling),
];

/// Human-readable stage descriptions
const STAGE_DESCRIPTIONS: &[(i64, &str)] = &[
    (1, "Auto bed leveling"),
    (2, "Heatbed preheating"),
    (3, "Sweeping XY mech mode"),
    (4, "Changing filament"),
    (5, "M400 pause"),
    (6, "Paused due to filament runout"),
    (7, "Heating hotend"),
    (8, "Calibrating extrusion"),
    (9, "Scanning bed surface"),
    (10, "Inspecting first layer"),
    (11, "Identifying build plate type"),
    (12, "Calibrating micro lidar"),
    (13, "Homing toolhead"),
    (14, "Cleaning nozzle tip"),
    (15, "Checking extruder temperature"),
    (16, "Paused by the user"),
    (17, "Paused due to front cover falling"),
    (18, "Calibrating the micro lidar"),
    (19, "Calibrating extrusion flow"),
    (20, "Paused due to nozzle temperature malfunction"),
    (21, "Paused due to heat bed temperature malfunction"),
    (22, "Filament unloading"),
    (23, "Paused due to skipped step"),
    (24, "Filament loading"),
    (25, "Calibrating motor noise"),
    (26, "Paused due to lost material system"),
    (27, "Paused due to low heat break fan speed"),
    (28, "Paused due to chamber temperature control error"),
    (29, "Cooling chamber"),
    (30, "Paused by inserted G-code"),
    (31, "Motor noise showoff"),
    (32, "Paused due to filament-covered nozzle"),
    (33, "Paused due to cutter error"),
    (34, "Paused due to first layer error"),
    (35, "Paused due to nozzle clog"),
];

fn match_state(raw: &str) -> Option<&'static StateRule> {
    let lowered = raw.to_ascii_lowercase();
    STATE_RULES
        .iter()
        .find(|rule| rule.needles.iter().any(|needle| lowered.contains(needle)))
}

/// Status for a vendor state string, if any rule matches
pub fn status_from_state(raw: &str) -> Option<LifecycleStatus> {
    match_state(raw).map(|rule| rule.status)
}

/// Status for a numeric stage code
pub fn status_from_stage(code: i64) -> LifecycleStatus {
    STAGE_STATUS
        .iter()
        .find(|(stage, _)| *stage == code)
        .map(|(_, status)| *status)
        .unwrap_or(LifecycleStatus::Printing)
}

/// Description for a numeric stage code
pub fn stage_description(code: i64) -> Option<&'static str> {
    STAGE_DESCRIPTIONS
        .iter()
        .find(|(stage, _)| *stage == code)
        .map(|(_, text)| *text)
}

/// Derive the lifecycle status, or `None` when neither field is usable
pub fn derive_status(state: Option<&str>, stage: Option<i64>) -> Option<LifecycleStatus> {
    state
        .and_then(status_from_state)
        .or_else(|| stage.map(status_from_stage))
}

/// Derive a human-readable status line
///
/// A described stage code wins while a job is underway; otherwise the
/// state-string phrase, then a word-capitalized rendering of the raw state.
pub fn detailed_status(state: Option<&str>, stage: Option<i64>) -> Option<String> {
    let status = derive_status(state, stage);
    let job_underway = !matches!(
        status,
        None | Some(LifecycleStatus::Idle)
            | Some(LifecycleStatus::Completed)
            | Some(LifecycleStatus::Error)
    );

    if job_underway {
        if let Some(text) = stage.and_then(stage_description) {
            return Some(text.to_string());
        }
    }

    if let Some(rule) = state.and_then(match_state) {
        return Some(rule.phrase.to_string());
    }

    state
        .map(capitalize_words)
        .filter(|s| !s.is_empty())
        .or_else(|| stage.and_then(stage_description).map(str::to_string))
}

/// `"SOME_RAW-state"` -> `"Some Raw State"`
pub fn capitalize_words(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_states() {
        assert_eq!(status_from_state("RUNNING"), Some(LifecycleStatus::Printing));
        assert_eq!(status_from_state("PAUSE"), Some(LifecycleStatus::Paused));
        assert_eq!(status_from_state("FINISH"), Some(LifecycleStatus::Completed));
        assert_eq!(status_from_state("FAILED"), Some(LifecycleStatus::Error));
        assert_eq!(status_from_state("IDLE"), Some(LifecycleStatus::Idle));
        assert_eq!(status_from_state("PREPARE"), Some(LifecycleStatus::Printing));
        assert_eq!(status_from_state("mystery"), None);
    }

    #[test]
    fn test_priority_order() {
        // homing outranks printing even when both appear
        assert_eq!(
            status_from_state("printing_homing"),
            Some(LifecycleStatus::Homing)
        );
        // pause outranks error
        assert_eq!(
            status_from_state("pause_on_error"),
            Some(LifecycleStatus::Paused)
        );
        assert_eq!(
            status_from_state("heatbed_preheating"),
            Some(LifecycleStatus::Heating)
        );
    }

    #[test]
    fn test_stage_fallback() {
        assert_eq!(derive_status(None, Some(13)), Some(LifecycleStatus::Homing));
        assert_eq!(derive_status(None, Some(255)), Some(LifecycleStatus::Idle));
        assert_eq!(derive_status(None, Some(0)), Some(LifecycleStatus::Printing));
        assert_eq!(derive_status(Some("weird"), Some(16)), Some(LifecycleStatus::Paused));
        assert_eq!(derive_status(Some("RUNNING"), Some(16)), Some(LifecycleStatus::Printing));
        assert_eq!(derive_status(None, None), None);
    }

    #[test]
    fn test_detailed_status() {
        assert_eq!(
            detailed_status(Some("RUNNING"), Some(2)).as_deref(),
            Some("Heatbed preheating")
        );
        assert_eq!(
            detailed_status(Some("RUNNING"), Some(0)).as_deref(),
            Some("Printing")
        );
        // stale stage codes are ignored once the job is over
        assert_eq!(
            detailed_status(Some("IDLE"), Some(1)).as_deref(),
            Some("Idle")
        );
        assert_eq!(
            detailed_status(Some("SOME_NEW_STATE"), None).as_deref(),
            Some("Some New State")
        );
        assert_eq!(detailed_status(None, None), None);
    }

    #[test]
    fn test_capitalize_words() {
        assert_eq!(capitalize_words("FILAMENT_LOADING"), "Filament Loading");
        assert_eq!(capitalize_words("nozzle-clog check"), "Nozzle Clog Check");
        assert_eq!(capitalize_words("__"), "");
    }
}
