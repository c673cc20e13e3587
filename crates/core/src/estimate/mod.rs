pub mod strategies;

use serde::{Deserialize, Serialize};

use crate::config::EstimatorConfig;
use crate::domain::device::DeviceModel;
use crate::domain::DomainError;
use crate::domain::pricing::{CandidateDevice, PartTypeId, RepairTypeId};

pub use strategies::{linear_interpolation_by_year, nearest_neighbor, weighted_average_by_similarity};

/// Closed set of ways an estimate can be produced. The wire names are part
/// of the persisted notes and of batch reports, so they never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    ExactMatch,
    LinearInterpolation,
    WeightedAverage,
    NearestNeighbor,
    CategoryAverage,
    FallbackAverage,
}

impl EstimationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::LinearInterpolation => "linear_interpolation",
            Self::WeightedAverage => "weighted_average",
            Self::NearestNeighbor => "nearest_neighbor",
            Self::CategoryAverage => "category_average",
            Self::FallbackAverage => "fallback_average",
        }
    }
}

impl std::str::FromStr for EstimationMethod {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "exact_match" => Ok(Self::ExactMatch),
            "linear_interpolation" => Ok(Self::LinearInterpolation),
            "weighted_average" => Ok(Self::WeightedAverage),
            "nearest_neighbor" => Ok(Self::NearestNeighbor),
            "category_average" => Ok(Self::CategoryAverage),
            "fallback_average" => Ok(Self::FallbackAverage),
            other => Err(DomainError::UnknownEstimationMethod(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    pub price: f64,
    pub confidence: f64,
    pub method: EstimationMethod,
}

/// Shared shape of all cascade strategies: given the target device, the
/// full candidate set, and the repair/part pair, either answer with a price
/// and confidence or decline. Keeping them as plain functions makes the
/// cascade reorderable and each strategy testable in isolation.
pub type Strategy = fn(
    &DeviceModel,
    &[CandidateDevice],
    RepairTypeId,
    PartTypeId,
    &EstimatorConfig,
) -> Option<EstimationResult>;

/// Cascade order is strict: interpolation answers before the weighted
/// average, which answers before the nearest neighbor.
pub const CASCADE: [Strategy; 3] =
    [linear_interpolation_by_year, weighted_average_by_similarity, nearest_neighbor];

pub fn run_cascade(
    target: &DeviceModel,
    candidates: &[CandidateDevice],
    repair_type_id: RepairTypeId,
    part_type_id: PartTypeId,
    config: &EstimatorConfig,
) -> Option<EstimationResult> {
    CASCADE
        .iter()
        .find_map(|strategy| strategy(target, candidates, repair_type_id, part_type_id, config))
}

/// Prices and confidences are reported in currency units with two decimal
/// places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use crate::config::EstimatorConfig;
    use crate::domain::device::{BrandId, DeviceKind, DeviceModel, DeviceModelId};
    use crate::domain::pricing::{CandidateDevice, PartTypeId, RepairTypeId};

    use super::{round2, run_cascade, EstimationMethod};

    const REPAIR: RepairTypeId = RepairTypeId(1);
    const PART: PartTypeId = PartTypeId(1);

    fn target(release_year: i32) -> DeviceModel {
        DeviceModel {
            id: DeviceModelId(100),
            name: "Galaxy S21".to_string(),
            brand_id: BrandId(1),
            brand_name: "Samsung".to_string(),
            release_year,
            kind: DeviceKind::Phone,
            screen_size: Some(6.2),
            is_active: true,
        }
    }

    fn candidate(id: i64, release_year: i32, price: f64) -> CandidateDevice {
        CandidateDevice {
            device_model_id: DeviceModelId(id),
            device_name: format!("model-{id}"),
            release_year,
            screen_size: Some(6.2),
            repair_type_id: REPAIR,
            part_type_id: PART,
            price,
        }
    }

    #[test]
    fn method_names_round_trip() {
        for method in [
            EstimationMethod::ExactMatch,
            EstimationMethod::LinearInterpolation,
            EstimationMethod::WeightedAverage,
            EstimationMethod::NearestNeighbor,
            EstimationMethod::CategoryAverage,
            EstimationMethod::FallbackAverage,
        ] {
            assert_eq!(method.as_str().parse::<EstimationMethod>(), Ok(method));
        }
    }

    #[test]
    fn rounding_is_to_two_decimal_places() {
        assert_eq!(round2(119.999), 120.0);
        assert_eq!(round2(0.005), 0.01);
        assert_eq!(round2(87.3), 87.3);
    }

    #[test]
    fn cascade_prefers_interpolation_when_bracketing_candidates_exist() {
        let config = EstimatorConfig::default();
        let candidates = vec![candidate(1, 2019, 100.0), candidate(2, 2023, 140.0)];

        let result = run_cascade(&target(2021), &candidates, REPAIR, PART, &config)
            .expect("bracketed target should be estimable");

        assert_eq!(result.method, EstimationMethod::LinearInterpolation);
    }

    #[test]
    fn cascade_falls_back_to_weighted_average_without_bracketing() {
        let config = EstimatorConfig::default();
        // Both candidates are older than the target, so interpolation declines.
        let candidates = vec![candidate(1, 2019, 100.0), candidate(2, 2020, 110.0)];

        let result = run_cascade(&target(2021), &candidates, REPAIR, PART, &config)
            .expect("one-sided candidates should still be estimable");

        assert_eq!(result.method, EstimationMethod::WeightedAverage);
    }

    #[test]
    fn cascade_declines_when_no_candidate_matches_the_pair() {
        let config = EstimatorConfig::default();
        let mut other_pair = candidate(1, 2020, 100.0);
        other_pair.part_type_id = PartTypeId(99);

        assert_eq!(run_cascade(&target(2021), &[other_pair], REPAIR, PART, &config), None);
    }
}
