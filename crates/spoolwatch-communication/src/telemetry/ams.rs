//! Material-system (AMS) extraction
//!
//! The material-system block is optional and moves around between report
//! types: it can sit under `print.ams` or at the top level, and the trays
//! either hang directly off it or off its first unit in `ams.ams[0]`.

use super::value::{integer, lookup, number, text};
use serde_json::Value;
use spoolwatch_core::{SlotHumidity, SlotUsage, DEFAULT_SPOOL_LENGTH_MM, MAX_SLOTS};
use tracing::debug;

/// Places the material-system block may live, outermost first
const CONTAINER_PATHS: &[&str] = &["print.ams", "ams"];

/// Raw lengths below this are metres; at or above, millimetres
const METRE_CUTOFF: f64 = 100.0;

/// `tray_now` values meaning "feeding from outside the material system"
const NO_ACTIVE_TRAY: [i64; 2] = [254, 255];

/// Everything the extractor could read from one payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaterialReport {
    /// One record per loaded or active slot, ordered by slot
    pub usage: Vec<SlotUsage>,
    /// Humidity attributed to slots
    pub humidity: Vec<SlotHumidity>,
    /// Slot feeding the toolhead, 1-based
    pub active_slot: Option<u8>,
}

/// Derives per-slot usage and humidity from a raw payload
#[derive(Debug, Clone)]
pub struct MaterialSystemExtractor {
    default_spool_length_mm: f64,
}

impl Default for MaterialSystemExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SPOOL_LENGTH_MM)
    }
}

/// One tray entry as found in the payload
struct RawTray<'a> {
    slot: u8,
    body: &'a Value,
}

impl MaterialSystemExtractor {
    /// Create an extractor that assumes `default_spool_length_mm` when a
    /// tray does not report its spool length
    pub fn new(default_spool_length_mm: f64) -> Self {
        Self {
            default_spool_length_mm,
        }
    }

    /// Extract material-system state, or `None` when the payload has no
    /// material-system block
    pub fn extract(&self, payload: &Value) -> Option<MaterialReport> {
        let container = CONTAINER_PATHS
            .iter()
            .find_map(|path| lookup(payload, path))
            .filter(|v| v.is_object() || v.is_array())?;

        let unit = Self::locate_unit(container);
        let active_slot = Self::active_slot(payload, container, unit);
        let trays = unit.map(Self::trays).unwrap_or_default();

        let usage: Vec<SlotUsage> = trays
            .iter()
            .filter_map(|tray| {
                let is_active = active_slot == Some(tray.slot);
                let loaded = Self::is_loaded(tray.body);
                (loaded || is_active).then(|| self.usage_for(tray, is_active))
            })
            .collect();

        let humidity = Self::humidity(container, unit)
            .map(|value| match active_slot {
                Some(slot) => vec![SlotHumidity {
                    slot,
                    humidity: value,
                }],
                None => trays
                    .iter()
                    .filter(|tray| Self::is_loaded(tray.body))
                    .map(|tray| SlotHumidity {
                        slot: tray.slot,
                        humidity: value,
                    })
                    .collect(),
            })
            .unwrap_or_default();

        debug!(
            slots = usage.len(),
            active = ?active_slot,
            "Extracted material-system state"
        );

        Some(MaterialReport {
            usage,
            humidity,
            active_slot,
        })
    }

    /// The unit object that carries `tray`
    fn locate_unit(container: &Value) -> Option<&Value> {
        if container.get("tray").is_some() {
            return Some(container);
        }
        if let Some(first) = container.as_array().and_then(|units| units.first()) {
            return Some(first);
        }
        lookup(container, "ams.0")
    }

    /// Active slot from `tray_now`, mapped from 0-based to 1-based
    fn active_slot(payload: &Value, container: &Value, unit: Option<&Value>) -> Option<u8> {
        let raw = [
            container.get("tray_now"),
            unit.and_then(|u| u.get("tray_now")),
            lookup(payload, "print.tray_now"),
            payload.get("tray_now"),
        ]
        .into_iter()
        .flatten()
        .find_map(integer)?;

        if NO_ACTIVE_TRAY.contains(&raw) {
            return None;
        }
        u8::try_from(raw)
            .ok()
            .filter(|index| *index < MAX_SLOTS)
            .map(|index| index + 1)
    }

    fn trays(unit: &Value) -> Vec<RawTray<'_>> {
        let Some(entries) = unit.get("tray").and_then(Value::as_array) else {
            return Vec::new();
        };

        entries
            .iter()
            .enumerate()
            .filter_map(|(index, body)| {
                let zero_based = body
                    .get("id")
                    .and_then(integer)
                    .unwrap_or(index as i64);
                let slot = u8::try_from(zero_based + 1).ok()?;
                (1..=MAX_SLOTS).contains(&slot).then_some(RawTray { slot, body })
            })
            .collect()
    }

    /// Material type present, or filament remaining
    fn is_loaded(tray: &Value) -> bool {
        let has_material = tray.get("tray_type").and_then(text).is_some();
        let has_remaining = tray
            .get("remain")
            .and_then(number)
            .is_some_and(|remain| remain > 0.0);
        has_material || has_remaining
    }

    fn usage_for(&self, tray: &RawTray<'_>, active: bool) -> SlotUsage {
        let total = tray
            .body
            .get("total_len")
            .and_then(number)
            .filter(|len| *len > 0.0)
            .map(to_millimetres)
            .unwrap_or(self.default_spool_length_mm);

        // A negative or missing remain means the printer does not know; treat
        // the spool as untouched rather than empty.
        let remaining = tray
            .body
            .get("remain")
            .and_then(number)
            .filter(|remain| *remain >= 0.0)
            .map(to_millimetres)
            .unwrap_or(total);

        SlotUsage::new(
            tray.slot,
            remaining,
            total,
            tray.body.get("tray_type").and_then(text),
            tray.body.get("tray_color").and_then(text),
            active,
        )
    }

    /// First plausible humidity reading, preferring the percentage field
    fn humidity(container: &Value, unit: Option<&Value>) -> Option<f64> {
        let sources = [Some(container), unit];
        ["humidity_raw", "humidity"].iter().find_map(|key| {
            sources
                .iter()
                .flatten()
                .filter_map(|source| source.get(*key))
                .filter_map(number)
                .find(|h| *h > 0.0 && *h <= 100.0)
        })
    }
}

/// Convert a raw length to millimetres
pub fn to_millimetres(raw: f64) -> f64 {
    if raw < METRE_CUTOFF {
        raw * 1000.0
    } else {
        raw
    }
}
