use serde::Serialize;
use tracing::{debug, info, warn};

use repricer_core::domain::device::DeviceModelId;
use repricer_core::domain::pricing::{PartTypeId, RepairTypeId};
use repricer_core::estimate::EstimationMethod;
use repricer_db::CatalogStore;

use crate::estimator::PriceEstimator;

/// Walks every uncovered (device, repair, part) combination, estimates a
/// price for it, and persists the confident ones. Combinations are handled
/// one at a time so a failure never stops the run.
pub struct BackfillOrchestrator<S> {
    estimator: PriceEstimator<S>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    /// Confidence met the auto-approve threshold and the price was written.
    AutoApproved,
    /// An estimate exists but is held back for manual review.
    NeedsReview,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct BackfillDetail {
    pub device_model_id: DeviceModelId,
    pub repair_type_id: RepairTypeId,
    pub part_type_id: PartTypeId,
    pub status: BackfillStatus,
    pub price: Option<f64>,
    pub confidence: Option<f64>,
    pub method: Option<EstimationMethod>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BackfillReport {
    pub estimated: usize,
    pub auto_approved: usize,
    pub needs_review: usize,
    pub failed: usize,
    pub details: Vec<BackfillDetail>,
}

impl<S: CatalogStore> BackfillOrchestrator<S> {
    pub fn new(estimator: PriceEstimator<S>) -> Self {
        Self { estimator }
    }

    pub fn into_estimator(self) -> PriceEstimator<S> {
        self.estimator
    }

    pub async fn run(&self) -> Result<BackfillReport, repricer_db::StoreError> {
        let combinations = self.estimator.store().missing_combinations().await?;
        info!(combinations = combinations.len(), "starting pricing backfill");

        let mut report = BackfillReport::default();
        for (device_model_id, repair_type_id, part_type_id) in combinations {
            let detail =
                self.backfill_one(device_model_id, repair_type_id, part_type_id).await;

            match detail.status {
                BackfillStatus::AutoApproved => {
                    report.estimated += 1;
                    report.auto_approved += 1;
                }
                BackfillStatus::NeedsReview => {
                    report.estimated += 1;
                    report.needs_review += 1;
                }
                BackfillStatus::Failed => report.failed += 1,
            }
            report.details.push(detail);
        }

        info!(
            estimated = report.estimated,
            auto_approved = report.auto_approved,
            needs_review = report.needs_review,
            failed = report.failed,
            "pricing backfill finished"
        );
        Ok(report)
    }

    async fn backfill_one(
        &self,
        device_model_id: DeviceModelId,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
    ) -> BackfillDetail {
        let mut detail = BackfillDetail {
            device_model_id,
            repair_type_id,
            part_type_id,
            status: BackfillStatus::Failed,
            price: None,
            confidence: None,
            method: None,
            error: None,
        };

        let estimate = match self
            .estimator
            .estimate(device_model_id, repair_type_id, part_type_id)
            .await
        {
            Ok(estimate) => estimate,
            Err(err) => {
                warn!(
                    device_model_id = device_model_id.0,
                    repair_type_id = repair_type_id.0,
                    part_type_id = part_type_id.0,
                    error = %err,
                    "backfill estimate failed"
                );
                detail.error = Some(err.to_string());
                return detail;
            }
        };

        detail.price = Some(estimate.price);
        detail.confidence = Some(estimate.confidence);
        detail.method = Some(estimate.method);

        if estimate.confidence < self.estimator.config().auto_approve_threshold {
            debug!(
                device_model_id = device_model_id.0,
                confidence = estimate.confidence,
                method = estimate.method.as_str(),
                "estimate held for review"
            );
            detail.status = BackfillStatus::NeedsReview;
            return detail;
        }

        let note = format!("auto-estimated using {}", estimate.method.as_str());
        match self
            .estimator
            .store()
            .insert_estimated_price(
                device_model_id,
                repair_type_id,
                part_type_id,
                estimate.price,
                estimate.confidence,
                &note,
            )
            .await
        {
            Ok(entry_id) => {
                debug!(
                    device_model_id = device_model_id.0,
                    pricing_entry_id = entry_id.0,
                    price = estimate.price,
                    confidence = estimate.confidence,
                    method = estimate.method.as_str(),
                    "estimate auto-approved"
                );
                detail.status = BackfillStatus::AutoApproved;
            }
            Err(err) => {
                warn!(
                    device_model_id = device_model_id.0,
                    error = %err,
                    "persisting an approved estimate failed"
                );
                detail.error = Some(err.to_string());
            }
        }
        detail
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use repricer_core::config::EstimatorConfig;
    use repricer_core::domain::device::{BrandId, DeviceKind, DeviceModel, DeviceModelId};
    use repricer_core::domain::pricing::{
        CandidateDevice, PartType, PartTypeId, PricingEntry, PricingEntryId, RepairType,
        RepairTypeId,
    };
    use repricer_core::estimate::EstimationMethod;
    use repricer_db::repositories::MissingCombination;
    use repricer_db::{CatalogStore, InMemoryCatalogStore, StoreError};

    use super::{BackfillOrchestrator, BackfillStatus};
    use crate::estimator::PriceEstimator;

    const REPAIR: RepairTypeId = RepairTypeId(1);
    const PART: PartTypeId = PartTypeId(1);

    fn device(id: i64, release_year: i32) -> DeviceModel {
        DeviceModel {
            id: DeviceModelId(id),
            name: format!("model-{id}"),
            brand_id: BrandId(1),
            brand_name: "Apple".to_string(),
            release_year,
            kind: DeviceKind::Phone,
            screen_size: Some(6.1),
            is_active: true,
        }
    }

    fn price_entry(id: i64, device_id: i64, price: f64) -> PricingEntry {
        PricingEntry {
            id: PricingEntryId(id),
            device_model_id: DeviceModelId(device_id),
            repair_type_id: REPAIR,
            part_type_id: PART,
            price,
            cost: None,
            is_estimated: false,
            confidence_score: 1.0,
            valid_from: (Utc::now() - Duration::days(30)).date_naive(),
            valid_until: None,
            is_active: true,
            notes: None,
            created_at: Utc::now(),
        }
    }

    async fn seed_master_data(store: &InMemoryCatalogStore) {
        store
            .insert_repair_type(RepairType { id: REPAIR, name: "Screen".to_string(), is_active: true })
            .await;
        store
            .insert_part_type(PartType { id: PART, name: "OEM".to_string(), is_active: true })
            .await;
    }

    fn orchestrator(store: InMemoryCatalogStore) -> BackfillOrchestrator<InMemoryCatalogStore> {
        BackfillOrchestrator::new(PriceEstimator::new(store, EstimatorConfig::default()))
    }

    #[tokio::test]
    async fn confident_estimates_are_persisted_with_a_method_note() {
        let store = InMemoryCatalogStore::new();
        seed_master_data(&store).await;
        store.insert_device(device(10, 2021)).await;
        store.insert_device(device(11, 2019)).await;
        store.insert_device(device(12, 2023)).await;
        store.insert_pricing(price_entry(1, 11, 100.0)).await;
        store.insert_pricing(price_entry(2, 12, 140.0)).await;

        let orchestrator = orchestrator(store);
        let report = orchestrator.run().await.expect("backfill run");

        assert_eq!(report.estimated, 1);
        assert_eq!(report.auto_approved, 1);
        assert_eq!(report.needs_review, 0);
        assert_eq!(report.failed, 0);

        let estimator = orchestrator.into_estimator();
        let entry = estimator
            .store()
            .find_current_price(DeviceModelId(10), REPAIR, PART)
            .await
            .expect("query")
            .expect("estimate was persisted");
        assert!(entry.is_estimated);
        assert_eq!(entry.price, 120.0);
        assert_eq!(
            entry.notes.as_deref(),
            Some("auto-estimated using linear_interpolation")
        );
    }

    #[tokio::test]
    async fn low_confidence_estimates_are_held_for_review() {
        let store = InMemoryCatalogStore::new();
        seed_master_data(&store).await;
        store.insert_device(device(10, 2021)).await;

        let orchestrator = orchestrator(store);
        let report = orchestrator.run().await.expect("backfill run");

        assert_eq!(report.estimated, 1);
        assert_eq!(report.auto_approved, 0);
        assert_eq!(report.needs_review, 1);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].status, BackfillStatus::NeedsReview);
        assert_eq!(report.details[0].method, Some(EstimationMethod::CategoryAverage));

        let estimator = orchestrator.into_estimator();
        let entry = estimator
            .store()
            .find_current_price(DeviceModelId(10), REPAIR, PART)
            .await
            .expect("query");
        assert!(entry.is_none(), "held estimates must not be persisted");
    }

    #[tokio::test]
    async fn the_run_reports_the_surviving_counts_as_json() {
        let store = InMemoryCatalogStore::new();
        seed_master_data(&store).await;
        store.insert_device(device(10, 2021)).await;

        let report = orchestrator(store).run().await.expect("backfill run");
        let json = serde_json::to_value(&report).expect("serialize report");

        assert_eq!(json["needs_review"], 1);
        assert_eq!(json["details"][0]["status"], "needs_review");
        assert_eq!(json["details"][0]["method"], "category_average");
    }

    /// Delegates to an in-memory store but fails device lookups for one id,
    /// so a single bad combination can be injected into a run.
    struct FailingDeviceStore {
        inner: InMemoryCatalogStore,
        poison: DeviceModelId,
    }

    #[async_trait]
    impl CatalogStore for FailingDeviceStore {
        async fn find_current_price(
            &self,
            device_model_id: DeviceModelId,
            repair_type_id: RepairTypeId,
            part_type_id: PartTypeId,
        ) -> Result<Option<PricingEntry>, StoreError> {
            self.inner.find_current_price(device_model_id, repair_type_id, part_type_id).await
        }

        async fn get_device(
            &self,
            device_model_id: DeviceModelId,
        ) -> Result<Option<DeviceModel>, StoreError> {
            if device_model_id == self.poison {
                return Err(StoreError::Decode("corrupt device row".to_string()));
            }
            self.inner.get_device(device_model_id).await
        }

        async fn find_candidate_devices(
            &self,
            brand_id: BrandId,
            kind: DeviceKind,
            exclude_device_id: DeviceModelId,
            year_lower: i32,
            year_upper: i32,
        ) -> Result<Vec<CandidateDevice>, StoreError> {
            self.inner
                .find_candidate_devices(brand_id, kind, exclude_device_id, year_lower, year_upper)
                .await
        }

        async fn average_price(
            &self,
            brand_id: Option<BrandId>,
            repair_type_id: RepairTypeId,
            part_type_id: PartTypeId,
        ) -> Result<Option<f64>, StoreError> {
            self.inner.average_price(brand_id, repair_type_id, part_type_id).await
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
            self.inner
                .insert_estimated_price(
                    device_model_id,
                    repair_type_id,
                    part_type_id,
                    price,
                    confidence,
                    note,
                )
                .await
        }

        async fn missing_combinations(&self) -> Result<Vec<MissingCombination>, StoreError> {
            self.inner.missing_combinations().await
        }
    }

    #[tokio::test]
    async fn one_failing_combination_does_not_stop_the_run() {
        let inner = InMemoryCatalogStore::new();
        seed_master_data(&inner).await;
        store_devices(&inner).await;

        let store = FailingDeviceStore { inner, poison: DeviceModelId(10) };
        let orchestrator =
            BackfillOrchestrator::new(PriceEstimator::new(store, EstimatorConfig::default()));
        let report = orchestrator.run().await.expect("backfill run");

        assert_eq!(report.failed, 1);
        assert_eq!(report.estimated, 2);
        let failed: Vec<_> = report
            .details
            .iter()
            .filter(|detail| detail.status == BackfillStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].device_model_id, DeviceModelId(10));
        assert!(failed[0].error.as_deref().unwrap_or_default().contains("corrupt device row"));
    }

    async fn store_devices(store: &InMemoryCatalogStore) {
        store.insert_device(device(10, 2021)).await;
        store.insert_device(device(11, 2019)).await;
        store.insert_device(device(12, 2023)).await;
    }
}
