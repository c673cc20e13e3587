use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::device::DeviceModelId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PricingEntryId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepairTypeId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartTypeId(pub i64);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepairType {
    pub id: RepairTypeId,
    pub name: String,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartType {
    pub id: PartTypeId,
    pub name: String,
    pub is_active: bool,
}

/// One priced row for a (device, repair type, part type) combination.
///
/// Rows are append-only: a superseded price is closed by deactivating it or
/// ending its validity window, never by mutating the price in place.
/// Human-entered rows carry `is_estimated = false` and confidence 1.0;
/// engine-created rows carry `is_estimated = true` and the computed
/// confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub id: PricingEntryId,
    pub device_model_id: DeviceModelId,
    pub repair_type_id: RepairTypeId,
    pub part_type_id: PartTypeId,
    pub price: f64,
    pub cost: Option<f64>,
    pub is_estimated: bool,
    pub confidence_score: f64,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PricingEntry {
    /// Whether this row still prices its combination as of `today`:
    /// active, with an open or not-yet-expired validity window.
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.is_active && self.valid_until.map_or(true, |until| until >= today)
    }
}

/// A priced sibling of the target device, joined with its price for one
/// specific (repair type, part type) pair. Query-shaped and transient; a
/// device with several priced rows appears once per row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateDevice {
    pub device_model_id: DeviceModelId,
    pub device_name: String,
    pub release_year: i32,
    pub screen_size: Option<f64>,
    pub repair_type_id: RepairTypeId,
    pub part_type_id: PartTypeId,
    pub price: f64,
}

impl CandidateDevice {
    pub fn matches_pair(&self, repair_type_id: RepairTypeId, part_type_id: PartTypeId) -> bool {
        self.repair_type_id == repair_type_id && self.part_type_id == part_type_id
    }
}
