//! Fixed-point temperature decoding
//!
//! Some reports carry temperatures as 16.16 fixed-point integers while others
//! carry plain degrees, and the same sensor switches encoding between report
//! types. A raw value above the sensor's threshold cannot be a direct Celsius
//! reading, so it is divided by 65536. Thresholds are observed values, not
//! vendor-documented ones, which is why they live in a table that can be
//! overridden from configuration.

use serde::{Deserialize, Serialize};

/// Divisor for 16.16 fixed-point values
pub const FIXED_POINT_SCALE: f64 = 65_536.0;

/// Temperature sensor kinds with independent decode thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    /// Either hotend
    Nozzle,
    /// Heated bed
    Bed,
    /// Enclosure chamber
    Chamber,
}

/// Per-sensor decode thresholds
///
/// Each threshold doubles as the upper bound of a plausible decoded reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeRules {
    /// Hottest plausible direct nozzle reading, °C
    pub nozzle_threshold: f64,
    /// Hottest plausible direct bed reading, °C
    pub bed_threshold: f64,
    /// Hottest plausible direct chamber reading, °C
    pub chamber_threshold: f64,
    /// Spool length assumed when a slot does not report one, mm
    pub default_spool_length_mm: f64,
}

impl Default for DecodeRules {
    fn default() -> Self {
        Self {
            nozzle_threshold: 500.0,
            bed_threshold: 200.0,
            chamber_threshold: 120.0,
            default_spool_length_mm: crate::data::DEFAULT_SPOOL_LENGTH_MM,
        }
    }
}

impl DecodeRules {
    /// Threshold for a sensor
    pub fn threshold(&self, sensor: Sensor) -> f64 {
        match sensor {
            Sensor::Nozzle => self.nozzle_threshold,
            Sensor::Bed => self.bed_threshold,
            Sensor::Chamber => self.chamber_threshold,
        }
    }

    /// Decode a raw reading to whole degrees
    ///
    /// `round(raw / 65536)` above the threshold, `round(raw)` otherwise.
    pub fn decode(&self, sensor: Sensor, raw: f64) -> f64 {
        if raw > self.threshold(sensor) {
            (raw / FIXED_POINT_SCALE).round()
        } else {
            raw.round()
        }
    }

    /// Decode and keep the value only if it is a plausible reading
    ///
    /// Zero counts as "not reported" so that later candidates get a chance.
    pub fn decode_plausible(&self, sensor: Sensor, raw: f64) -> Option<f64> {
        if !raw.is_finite() {
            return None;
        }
        let decoded = self.decode(sensor, raw);
        (decoded > 0.0 && decoded <= self.threshold(sensor)).then_some(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_nozzle() {
        let rules = DecodeRules::default();
        assert_eq!(rules.decode(Sensor::Nozzle, 17_694_990.0), 270.0);
        assert_eq!(rules.decode(Sensor::Nozzle, 74.0), 74.0);
        assert_eq!(rules.decode(Sensor::Nozzle, 219.6), 220.0);
    }

    #[test]
    fn test_thresholds_are_per_sensor() {
        let rules = DecodeRules::default();
        // 300 is a direct nozzle reading but too hot for a bed
        assert_eq!(rules.decode(Sensor::Nozzle, 300.0), 300.0);
        assert_eq!(rules.decode(Sensor::Bed, 300.0), 0.0);
    }

    #[test]
    fn test_plausibility() {
        let rules = DecodeRules::default();
        assert_eq!(rules.decode_plausible(Sensor::Bed, 0.0), None);
        assert_eq!(rules.decode_plausible(Sensor::Bed, 55.0), Some(55.0));
        assert_eq!(rules.decode_plausible(Sensor::Chamber, f64::NAN), None);
        // 900 * 65536 decodes to 900, far above any nozzle
        assert_eq!(rules.decode_plausible(Sensor::Nozzle, 58_982_400.0), None);
    }

    #[test]
    fn test_rules_deserialize_with_partial_overrides() {
        let rules: DecodeRules = serde_json::from_str(r#"{"chamber_threshold": 90.0}"#).unwrap();
        assert_eq!(rules.chamber_threshold, 90.0);
        assert_eq!(rules.nozzle_threshold, 500.0);
    }
}
