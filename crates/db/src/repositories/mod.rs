use async_trait::async_trait;
use thiserror::Error;

use repricer_core::domain::device::{BrandId, DeviceKind, DeviceModel, DeviceModelId};
use repricer_core::domain::pricing::{
    CandidateDevice, PartTypeId, PricingEntry, PricingEntryId, RepairTypeId,
};

pub mod catalog;
pub mod memory;

pub use catalog::SqlCatalogStore;
pub use memory::InMemoryCatalogStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// One missing (device, repair type, part type) combination to backfill.
pub type MissingCombination = (DeviceModelId, RepairTypeId, PartTypeId);

/// Narrow data-access contract over the pricing catalog. The estimation
/// engine only ever talks to the catalog through this trait, so tests can
/// substitute deterministic fixtures.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// The current explicit price for a combination: active, validity
    /// window still open, most recent `valid_from` wins.
    async fn find_current_price(
        &self,
        device_model_id: DeviceModelId,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
    ) -> Result<Option<PricingEntry>, StoreError>;

    async fn get_device(
        &self,
        device_model_id: DeviceModelId,
    ) -> Result<Option<DeviceModel>, StoreError>;

    /// Priced devices of the same brand and kind released within the given
    /// year window, excluding the target itself. One row per active priced
    /// entry, ordered ascending by year distance from the window midpoint
    /// (the window is symmetric around the target year), ties broken by
    /// device id then entry id.
    async fn find_candidate_devices(
        &self,
        brand_id: BrandId,
        kind: DeviceKind,
        exclude_device_id: DeviceModelId,
        year_lower: i32,
        year_upper: i32,
    ) -> Result<Vec<CandidateDevice>, StoreError>;

    /// Mean active price for the (repair, part) pair, scoped to a brand when
    /// one is given and across all brands otherwise. `None` when no rows
    /// match.
    async fn average_price(
        &self,
        brand_id: Option<BrandId>,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
    ) -> Result<Option<f64>, StoreError>;

    /// Append an engine-estimated entry. The row becomes current as of
    /// today, open-ended, with `is_estimated = true`.
    async fn insert_estimated_price(
        &self,
        device_model_id: DeviceModelId,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
        price: f64,
        confidence: f64,
        note: &str,
    ) -> Result<PricingEntryId, StoreError>;

    /// Every combination of active device, repair type and part type that
    /// lacks a current active pricing entry.
    async fn missing_combinations(&self) -> Result<Vec<MissingCombination>, StoreError>;
}
