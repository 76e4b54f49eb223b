//! Material-system slot records

use serde::{Deserialize, Serialize};

/// Length of a standard 1 kg spool, in millimeters
pub const DEFAULT_SPOOL_LENGTH_MM: f64 = 330_000.0;

/// Number of slots in one material-system unit
pub const MAX_SLOTS: u8 = 4;

/// Usage of one material-system slot
///
/// `used_length_mm` and `used_percentage` are derived in [`SlotUsage::new`];
/// used length never goes negative and the percentage stays within 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotUsage {
    /// Slot number, 1-4
    pub slot: u8,
    /// Remaining filament, mm
    pub remaining_length_mm: f64,
    /// Spool length, mm
    pub total_length_mm: f64,
    /// Consumed filament, mm
    pub used_length_mm: f64,
    /// Consumed share of the spool, 0-100
    pub used_percentage: f64,
    /// Material type, e.g. `PLA`
    pub material: Option<String>,
    /// Color as reported, usually `RRGGBBAA`
    pub color: Option<String>,
    /// Slot currently feeding the toolhead
    pub active: bool,
}

impl SlotUsage {
    /// Build a usage record and derive the used length and percentage
    pub fn new(
        slot: u8,
        remaining_length_mm: f64,
        total_length_mm: f64,
        material: Option<String>,
        color: Option<String>,
        active: bool,
    ) -> Self {
        let used_length_mm = (total_length_mm - remaining_length_mm).max(0.0);
        let used_percentage = if total_length_mm > 0.0 {
            (used_length_mm / total_length_mm * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        Self {
            slot,
            remaining_length_mm,
            total_length_mm,
            used_length_mm,
            used_percentage,
            material,
            color,
            active,
        }
    }
}

/// Humidity attributed to one slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotHumidity {
    /// Slot number, 1-4
    pub slot: u8,
    /// Relative humidity or vendor humidity index
    pub humidity: f64,
}
