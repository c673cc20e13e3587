use thiserror::Error;
use tracing::debug;

use repricer_core::config::EstimatorConfig;
use repricer_core::domain::device::{BrandId, DeviceModelId};
use repricer_core::domain::pricing::{PartTypeId, RepairTypeId};
use repricer_core::estimate::{round2, run_cascade, EstimationMethod, EstimationResult};
use repricer_db::{CatalogStore, StoreError};

/// Confidence assigned when no similar devices exist and the estimate comes
/// straight from a category average.
const CATEGORY_AVERAGE_CONFIDENCE: f64 = 0.5;
/// Confidence assigned when similar devices exist but every interpolation
/// strategy declined.
const FALLBACK_AVERAGE_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("device model {0:?} does not exist")]
    DeviceNotFound(DeviceModelId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Produces a price estimate for any (device, repair, part) combination.
///
/// Resolution order: an explicit current price wins outright, then the
/// interpolation cascade over similar devices, then brand and global
/// category averages, and finally the configured default price. Every path
/// yields an answer, only the confidence degrades.
pub struct PriceEstimator<S> {
    store: S,
    config: EstimatorConfig,
}

impl<S: CatalogStore> PriceEstimator<S> {
    pub fn new(store: S, config: EstimatorConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub async fn estimate(
        &self,
        device_model_id: DeviceModelId,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
    ) -> Result<EstimationResult, EstimateError> {
        if let Some(entry) =
            self.store.find_current_price(device_model_id, repair_type_id, part_type_id).await?
        {
            return Ok(EstimationResult {
                price: round2(entry.price),
                confidence: 1.0,
                method: EstimationMethod::ExactMatch,
            });
        }

        let device = self
            .store
            .get_device(device_model_id)
            .await?
            .ok_or(EstimateError::DeviceNotFound(device_model_id))?;

        let window = self.config.similar_year_window;
        let candidates = self
            .store
            .find_candidate_devices(
                device.brand_id,
                device.kind,
                device.id,
                device.release_year - window,
                device.release_year + window,
            )
            .await?;

        if candidates.is_empty() {
            let price = self.category_average(device.brand_id, repair_type_id, part_type_id).await?;
            debug!(
                device_model_id = device_model_id.0,
                price, "no similar devices, estimated from category average"
            );
            return Ok(EstimationResult {
                price,
                confidence: CATEGORY_AVERAGE_CONFIDENCE,
                method: EstimationMethod::CategoryAverage,
            });
        }

        if let Some(result) =
            run_cascade(&device, &candidates, repair_type_id, part_type_id, &self.config)
        {
            debug!(
                device_model_id = device_model_id.0,
                method = result.method.as_str(),
                price = result.price,
                confidence = result.confidence,
                "estimated from similar devices"
            );
            return Ok(result);
        }

        let price = self.category_average(device.brand_id, repair_type_id, part_type_id).await?;
        debug!(
            device_model_id = device_model_id.0,
            price, "every strategy declined, estimated from category average"
        );
        Ok(EstimationResult {
            price,
            confidence: FALLBACK_AVERAGE_CONFIDENCE,
            method: EstimationMethod::FallbackAverage,
        })
    }

    /// Brand-scoped mean first, then the global mean, then the configured
    /// default price.
    async fn category_average(
        &self,
        brand_id: BrandId,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
    ) -> Result<f64, EstimateError> {
        if let Some(avg) =
            self.store.average_price(Some(brand_id), repair_type_id, part_type_id).await?
        {
            return Ok(round2(avg));
        }
        if let Some(avg) = self.store.average_price(None, repair_type_id, part_type_id).await? {
            return Ok(round2(avg));
        }
        Ok(round2(self.config.fallback_default_price))
    }
}
