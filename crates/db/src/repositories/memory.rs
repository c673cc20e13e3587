use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use repricer_core::domain::device::{BrandId, DeviceKind, DeviceModel, DeviceModelId};
use repricer_core::domain::pricing::{
    CandidateDevice, PartType, PartTypeId, PricingEntry, PricingEntryId, RepairType, RepairTypeId,
};

use super::{CatalogStore, MissingCombination, StoreError};

/// Deterministic catalog fixture for tests and local development. Seeded
/// through the insert helpers, then consumed through the `CatalogStore`
/// contract exactly like the SQL store.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<CatalogData>,
}

#[derive(Default)]
struct CatalogData {
    devices: Vec<DeviceModel>,
    repair_types: Vec<RepairType>,
    part_types: Vec<PartType>,
    pricing: Vec<PricingEntry>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_device(&self, device: DeviceModel) {
        self.inner.write().await.devices.push(device);
    }

    pub async fn insert_repair_type(&self, repair_type: RepairType) {
        self.inner.write().await.repair_types.push(repair_type);
    }

    pub async fn insert_part_type(&self, part_type: PartType) {
        self.inner.write().await.part_types.push(part_type);
    }

    pub async fn insert_pricing(&self, entry: PricingEntry) {
        self.inner.write().await.pricing.push(entry);
    }

    pub async fn pricing_entries(&self) -> Vec<PricingEntry> {
        self.inner.read().await.pricing.clone()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn find_current_price(
        &self,
        device_model_id: DeviceModelId,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
    ) -> Result<Option<PricingEntry>, StoreError> {
        let today = Utc::now().date_naive();
        let data = self.inner.read().await;

        let current = data
            .pricing
            .iter()
            .filter(|entry| {
                entry.device_model_id == device_model_id
                    && entry.repair_type_id == repair_type_id
                    && entry.part_type_id == part_type_id
                    && entry.is_current(today)
            })
            .max_by_key(|entry| (entry.valid_from, entry.id.0));

        Ok(current.cloned())
    }

    async fn get_device(
        &self,
        device_model_id: DeviceModelId,
    ) -> Result<Option<DeviceModel>, StoreError> {
        let data = self.inner.read().await;
        Ok(data.devices.iter().find(|device| device.id == device_model_id).cloned())
    }

    async fn find_candidate_devices(
        &self,
        brand_id: BrandId,
        kind: DeviceKind,
        exclude_device_id: DeviceModelId,
        year_lower: i32,
        year_upper: i32,
    ) -> Result<Vec<CandidateDevice>, StoreError> {
        let today = Utc::now().date_naive();
        let data = self.inner.read().await;

        let mut candidates: Vec<(i64, CandidateDevice)> = Vec::new();
        for device in &data.devices {
            let in_scope = device.brand_id == brand_id
                && device.kind == kind
                && device.id != exclude_device_id
                && (year_lower..=year_upper).contains(&device.release_year);
            if !in_scope {
                continue;
            }

            for entry in &data.pricing {
                if entry.device_model_id != device.id || !entry.is_current(today) {
                    continue;
                }
                candidates.push((
                    entry.id.0,
                    CandidateDevice {
                        device_model_id: device.id,
                        device_name: device.name.clone(),
                        release_year: device.release_year,
                        screen_size: device.screen_size,
                        repair_type_id: entry.repair_type_id,
                        part_type_id: entry.part_type_id,
                        price: entry.price,
                    },
                ));
            }
        }

        // Same ordering contract as the SQL store: distance from the window
        // midpoint, then device id, then entry id.
        let midpoint_doubled = year_lower + year_upper;
        candidates.sort_by_key(|(entry_id, candidate)| {
            (
                (2 * candidate.release_year - midpoint_doubled).abs(),
                candidate.device_model_id,
                *entry_id,
            )
        });

        Ok(candidates.into_iter().map(|(_, candidate)| candidate).collect())
    }

    async fn average_price(
        &self,
        brand_id: Option<BrandId>,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
    ) -> Result<Option<f64>, StoreError> {
        let today = Utc::now().date_naive();
        let data = self.inner.read().await;

        let prices: Vec<f64> = data
            .pricing
            .iter()
            .filter(|entry| {
                entry.repair_type_id == repair_type_id
                    && entry.part_type_id == part_type_id
                    && entry.is_current(today)
            })
            .filter(|entry| match brand_id {
                Some(brand_id) => data
                    .devices
                    .iter()
                    .any(|device| device.id == entry.device_model_id && device.brand_id == brand_id),
                None => true,
            })
            .map(|entry| entry.price)
            .collect();

        if prices.is_empty() {
            return Ok(None);
        }
        Ok(Some(prices.iter().sum::<f64>() / prices.len() as f64))
    }

    async fn insert_estimated_price(
        &self,
        device_model_id: DeviceModelId,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
        price: f64,
        confidence: f64,
        note: &str,
    ) -> Result<PricingEntryId, StoreError> {
        let today = Utc::now().date_naive();
        let mut data = self.inner.write().await;

        let next_id =
            PricingEntryId(data.pricing.iter().map(|entry| entry.id.0).max().unwrap_or(0) + 1);
        data.pricing.push(PricingEntry {
            id: next_id,
            device_model_id,
            repair_type_id,
            part_type_id,
            price,
            cost: None,
            is_estimated: true,
            confidence_score: confidence,
            valid_from: today,
            valid_until: None,
            is_active: true,
            notes: Some(note.to_string()),
            created_at: Utc::now(),
        });

        Ok(next_id)
    }

    async fn missing_combinations(&self) -> Result<Vec<MissingCombination>, StoreError> {
        let today = Utc::now().date_naive();
        let data = self.inner.read().await;

        let mut missing = Vec::new();
        for device in data.devices.iter().filter(|device| device.is_active) {
            for repair_type in data.repair_types.iter().filter(|rt| rt.is_active) {
                for part_type in data.part_types.iter().filter(|pt| pt.is_active) {
                    let priced = data.pricing.iter().any(|entry| {
                        entry.device_model_id == device.id
                            && entry.repair_type_id == repair_type.id
                            && entry.part_type_id == part_type.id
                            && entry.is_current(today)
                    });
                    if !priced {
                        missing.push((device.id, repair_type.id, part_type.id));
                    }
                }
            }
        }

        missing.sort_by_key(|(device, repair, part)| (device.0, repair.0, part.0));
        Ok(missing)
    }
}
