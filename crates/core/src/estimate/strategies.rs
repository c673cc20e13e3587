use crate::config::EstimatorConfig;
use crate::domain::device::{DeviceModel, DeviceModelId};
use crate::domain::pricing::{CandidateDevice, PartTypeId, RepairTypeId};

use super::{round2, EstimationMethod, EstimationResult};

/// Linear interpolation between the closest priced device released before
/// the target and the closest released after it.
///
/// Declines when either side of the bracket is empty. Confidence blends
/// year proximity (maximal at the midpoint of the bracket) with price
/// stability (large gaps between the bracket prices reduce trust).
pub fn linear_interpolation_by_year(
    target: &DeviceModel,
    candidates: &[CandidateDevice],
    repair_type_id: RepairTypeId,
    part_type_id: PartTypeId,
    config: &EstimatorConfig,
) -> Option<EstimationResult> {
    // One (year, price) pair per device; the first row wins because
    // candidates arrive ordered closest-first.
    let mut device_prices: Vec<(DeviceModelId, i32, f64)> = Vec::new();
    for candidate in candidates {
        if !candidate.matches_pair(repair_type_id, part_type_id) {
            continue;
        }
        if !device_prices.iter().any(|(id, _, _)| *id == candidate.device_model_id) {
            device_prices.push((candidate.device_model_id, candidate.release_year, candidate.price));
        }
    }

    if device_prices.len() < 2 {
        return None;
    }

    device_prices.sort_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));

    let (_, lower_year, lower_price) = *device_prices
        .iter()
        .filter(|(_, year, _)| *year < target.release_year)
        .next_back()?;
    let (_, upper_year, upper_price) = *device_prices
        .iter()
        .find(|(_, year, _)| *year > target.release_year)?;

    let year_span = upper_year - lower_year;
    if year_span == 0 {
        return None;
    }

    let year_ratio = f64::from(target.release_year - lower_year) / f64::from(year_span);
    let price = lower_price + year_ratio * (upper_price - lower_price);

    let year_proximity = 1.0 - (year_ratio - 0.5).abs() * 0.4;
    let price_gap = (upper_price - lower_price).abs() / lower_price.max(upper_price);
    let price_stability = 1.0 - price_gap.min(0.5);
    let confidence =
        config.linear_confidence.apply(year_proximity * 0.6 + price_stability * 0.4);

    Some(EstimationResult {
        price: round2(price.max(0.0)),
        confidence: round2(confidence),
        method: EstimationMethod::LinearInterpolation,
    })
}

/// Similarity-weighted mean over every matching candidate row.
///
/// Applicable whenever at least one candidate matches the pair; no
/// bracketing requirement. Year proximity dominates the weight, screen-size
/// proximity refines it. Confidence grows with sample size and with the
/// strength of the single best match.
pub fn weighted_average_by_similarity(
    target: &DeviceModel,
    candidates: &[CandidateDevice],
    repair_type_id: RepairTypeId,
    part_type_id: PartTypeId,
    config: &EstimatorConfig,
) -> Option<EstimationResult> {
    let target_screen = target.screen_size.unwrap_or(0.0);

    let mut sample_count = 0usize;
    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;
    let mut best_weight = 0.0f64;

    for candidate in candidates {
        if !candidate.matches_pair(repair_type_id, part_type_id) {
            continue;
        }

        let year_gap = f64::from((candidate.release_year - target.release_year).abs());
        let year_weight = 1.0 / (1.0 + year_gap);

        // A candidate without a recorded screen size weighs in at 0 inches.
        let screen_gap = (candidate.screen_size.unwrap_or(0.0) - target_screen).abs();
        let screen_weight = 1.0 / (1.0 + screen_gap);

        let weight = year_weight * 0.7 + screen_weight * 0.3;
        sample_count += 1;
        total_weight += weight;
        weighted_sum += candidate.price * weight;
        best_weight = best_weight.max(weight);
    }

    if sample_count == 0 {
        return None;
    }

    let price = weighted_sum / total_weight;
    let sample_confidence = (sample_count as f64 / 5.0).min(1.0);
    let confidence =
        config.weighted_confidence.apply(sample_confidence * 0.5 + best_weight * 0.5);

    Some(EstimationResult {
        price: round2(price),
        confidence: round2(confidence),
        method: EstimationMethod::WeightedAverage,
    })
}

/// Price of the single closest candidate by year distance, adjusted by a
/// fixed rate per year of difference.
///
/// The adjustment is signed: a neighbor older than the target raises the
/// estimate, a newer one lowers it. Ties on year distance resolve to the
/// lowest device id so iteration order never decides the answer. Adjusted
/// prices clamp at zero.
pub fn nearest_neighbor(
    target: &DeviceModel,
    candidates: &[CandidateDevice],
    repair_type_id: RepairTypeId,
    part_type_id: PartTypeId,
    config: &EstimatorConfig,
) -> Option<EstimationResult> {
    let mut nearest: Option<&CandidateDevice> = None;
    for candidate in candidates {
        if !candidate.matches_pair(repair_type_id, part_type_id) {
            continue;
        }

        let distance = (candidate.release_year - target.release_year).abs();
        let replace = match nearest {
            None => true,
            Some(best) => {
                let best_distance = (best.release_year - target.release_year).abs();
                distance < best_distance
                    || (distance == best_distance
                        && candidate.device_model_id < best.device_model_id)
            }
        };
        if replace {
            nearest = Some(candidate);
        }
    }

    let neighbor = nearest?;
    let year_gap = target.release_year - neighbor.release_year;
    let price = neighbor.price * (1.0 + config.year_adjustment_rate * f64::from(year_gap));

    let confidence =
        config.nearest_confidence.apply(0.85 - 0.1 * f64::from(year_gap.abs()));

    Some(EstimationResult {
        price: round2(price.max(0.0)),
        confidence: round2(confidence),
        method: EstimationMethod::NearestNeighbor,
    })
}
