//! Confidence scorer.
//!
//! Combines building-data quality, geometry precision, solar-calculation
//! accuracy, shadow-model accuracy and weather cloud cover into a single
//! confidence value, plus the categorical exposure state classification.
//!
//! The weighting is heuristic and hand-tuned rather than derived; it lives
//! in [`ConfidenceWeights`](crate::config::ConfidenceWeights) so deployments
//! can adjust it without touching this pure function. Defaults put the most
//! weight on building data and cloud cover, the dominant variance sources.

use crate::api::{ConfidenceFactors, ExposureState};
use crate::config::ConfidenceWeights;

/// Solar position math is pure and near-exact; its accuracy factor is a
/// high constant.
pub const SOLAR_ACCURACY: f64 = 0.95;

/// Baseline accuracy of the convex-hull shadow simplification.
pub const SHADOW_ACCURACY: f64 = 0.90;

/// Inputs to a confidence score, all in [0, 1] except cloud cover which is
/// absent when the weather collaborator had nothing to offer.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInput {
    pub building_data_quality: f64,
    pub geometry_precision: f64,
    pub solar_accuracy: f64,
    pub shadow_accuracy: f64,
    /// Cloud cover fraction in [0, 1], `None` when no observation exists.
    pub cloud_cover: Option<f64>,
}

/// Produce the weighted confidence breakdown for one exposure computation.
pub fn score(input: ConfidenceInput, weights: &ConfidenceWeights) -> ConfidenceFactors {
    let building = input.building_data_quality.clamp(0.0, 1.0);
    let geometry = input.geometry_precision.clamp(0.0, 1.0);
    let solar = input.solar_accuracy.clamp(0.0, 1.0);
    let shadow = input.shadow_accuracy.clamp(0.0, 1.0);

    // Heavy cloud cover means low certainty that computed sun actually
    // reaches the patio. Missing weather collapses to a fixed penalty.
    let (weather_certainty, weather_available) = match input.cloud_cover {
        Some(cover) => ((1.0 - cover).clamp(0.0, 1.0), true),
        None => (weights.missing_weather_certainty.clamp(0.0, 1.0), false),
    };

    let weight_sum =
        weights.building + weights.geometry + weights.solar + weights.shadow + weights.weather;
    let overall = ((weights.building * building
        + weights.geometry * geometry
        + weights.solar * solar
        + weights.shadow * shadow
        + weights.weather * weather_certainty)
        / weight_sum)
        .clamp(0.0, 1.0);

    ConfidenceFactors {
        building_data_quality: building,
        geometry_precision: geometry,
        solar_accuracy: solar,
        shadow_accuracy: shadow,
        weather_certainty,
        weather_available,
        overall,
    }
}

/// Whether a confidence value should be surfaced to clients as reliable.
pub fn is_reliable(confidence: f64, weights: &ConfidenceWeights) -> bool {
    confidence >= weights.reliable_threshold
}

/// Categorical exposure state from solar elevation and sunlit percentage.
///
/// NoSun is forced whenever the sun is at or below the horizon, regardless
/// of the geometry result.
pub fn classify_state(elevation_deg: f64, sunlit_pct: f64) -> ExposureState {
    if elevation_deg <= 0.0 {
        ExposureState::NoSun
    } else if sunlit_pct >= 70.0 {
        ExposureState::Sunny
    } else if sunlit_pct >= 30.0 {
        ExposureState::Partial
    } else {
        ExposureState::Shaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(cloud_cover: Option<f64>) -> ConfidenceInput {
        ConfidenceInput {
            building_data_quality: 1.0,
            geometry_precision: 1.0,
            solar_accuracy: SOLAR_ACCURACY,
            shadow_accuracy: SHADOW_ACCURACY,
            cloud_cover,
        }
    }

    #[test]
    fn test_high_quality_no_weather_still_reliable() {
        let weights = ConfidenceWeights::default();
        let factors = score(input(None), &weights);

        assert!(!factors.weather_available);
        assert!(
            factors.overall >= 0.8,
            "expected >= 0.8 absent cloud data, got {}",
            factors.overall
        );
        assert!(is_reliable(factors.overall, &weights));
    }

    #[test]
    fn test_clear_sky_beats_missing_weather() {
        let weights = ConfidenceWeights::default();
        let clear = score(input(Some(0.0)), &weights);
        let missing = score(input(None), &weights);
        assert!(clear.overall > missing.overall);
    }

    #[test]
    fn test_overcast_drags_confidence_down() {
        let weights = ConfidenceWeights::default();
        let clear = score(input(Some(0.0)), &weights);
        let overcast = score(input(Some(1.0)), &weights);
        assert!(overcast.overall < clear.overall);
        assert!((overcast.weather_certainty - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_poor_building_data_unreliable() {
        let weights = ConfidenceWeights::default();
        let factors = score(
            ConfidenceInput {
                building_data_quality: 0.1,
                geometry_precision: 0.2,
                solar_accuracy: SOLAR_ACCURACY,
                shadow_accuracy: SHADOW_ACCURACY,
                cloud_cover: Some(0.9),
            },
            &weights,
        );
        assert!(!is_reliable(factors.overall, &weights));
    }

    #[test]
    fn test_inputs_clamped() {
        let weights = ConfidenceWeights::default();
        let factors = score(
            ConfidenceInput {
                building_data_quality: 1.7,
                geometry_precision: -0.3,
                solar_accuracy: 1.0,
                shadow_accuracy: 1.0,
                cloud_cover: Some(-2.0),
            },
            &weights,
        );
        assert!((factors.building_data_quality - 1.0).abs() < 1e-9);
        assert!((factors.geometry_precision - 0.0).abs() < 1e-9);
        assert!(factors.overall <= 1.0);
    }

    #[test]
    fn test_state_classification_bounds() {
        assert_eq!(classify_state(-1.0, 100.0), ExposureState::NoSun);
        assert_eq!(classify_state(0.0, 100.0), ExposureState::NoSun);
        assert_eq!(classify_state(30.0, 70.0), ExposureState::Sunny);
        assert_eq!(classify_state(30.0, 69.99), ExposureState::Partial);
        assert_eq!(classify_state(30.0, 30.0), ExposureState::Partial);
        assert_eq!(classify_state(30.0, 29.99), ExposureState::Shaded);
    }

    #[test]
    fn test_score_display_scale() {
        let weights = ConfidenceWeights::default();
        let factors = score(input(Some(0.0)), &weights);
        let displayed = factors.score();
        assert_eq!(displayed, (factors.overall * 100.0).round() as u8);
    }
}
