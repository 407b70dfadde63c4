//! Core engine configuration.
//!
//! This module provides the tunables for the exposure engine, cache layers
//! and precomputation scheduler, loadable from a TOML configuration file.
//! The city location is explicit configuration passed at construction; the
//! core itself is location-agnostic.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::api::{CoreError, CoreResult};

/// Top-level configuration for the sun exposure core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub location: LocationSettings,
    #[serde(default)]
    pub exposure: ExposureSettings,
    #[serde(default)]
    pub shadow: ShadowSettings,
    #[serde(default)]
    pub confidence: ConfidenceWeights,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub timeline: TimelineSettings,
}

/// City reference point used by the scheduler to plan daylight time slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSettings {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

/// Orchestrator limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureSettings {
    /// Maximum number of patio ids accepted by a single batch request.
    #[serde(default = "default_batch_cap")]
    pub batch_cap: usize,
}

impl Default for ExposureSettings {
    fn default() -> Self {
        Self {
            batch_cap: default_batch_cap(),
        }
    }
}

/// Shadow casting tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowSettings {
    /// Radius around a patio within which buildings can cast shadows onto it.
    #[serde(default = "default_search_radius_m")]
    pub search_radius_m: f64,
    /// Cap on projected shadow length; low solar elevations would otherwise
    /// produce kilometer-scale polygons.
    #[serde(default = "default_max_shadow_length_m")]
    pub max_shadow_length_m: f64,
    /// Elevations above this are treated as vertical: the projection
    /// collapses onto the footprint instead of dividing by tan(~90 deg).
    #[serde(default = "default_near_vertical_deg")]
    pub near_vertical_deg: f64,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            search_radius_m: default_search_radius_m(),
            max_shadow_length_m: default_max_shadow_length_m(),
            near_vertical_deg: default_near_vertical_deg(),
        }
    }
}

/// Weights for the confidence combination, normalized at scoring time.
///
/// Defaults reflect the dominant variance sources: building-data quality
/// and cloud cover carry the most weight, solar math the least. The
/// weighting is heuristic and deliberately configurable rather than a
/// fixed formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    #[serde(default = "default_w_building")]
    pub building: f64,
    #[serde(default = "default_w_geometry")]
    pub geometry: f64,
    #[serde(default = "default_w_solar")]
    pub solar: f64,
    #[serde(default = "default_w_shadow")]
    pub shadow: f64,
    #[serde(default = "default_w_weather")]
    pub weather: f64,
    /// Weather factor substituted when no observation is available.
    #[serde(default = "default_missing_weather_certainty")]
    pub missing_weather_certainty: f64,
    /// Confidence at or above this is surfaced to clients as reliable.
    #[serde(default = "default_reliable_threshold")]
    pub reliable_threshold: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            building: default_w_building(),
            geometry: default_w_geometry(),
            solar: default_w_solar(),
            shadow: default_w_shadow(),
            weather: default_w_weather(),
            missing_weather_certainty: default_missing_weather_certainty(),
            reliable_threshold: default_reliable_threshold(),
        }
    }
}

/// Multi-layer cache tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Timestamps are rounded to this granularity to form cache keys.
    #[serde(default = "default_granularity_minutes")]
    pub granularity_minutes: i64,
    /// Precomputed rows within this window of the requested timestamp are
    /// accepted as a match. Accuracy/performance tradeoff, not an invariant.
    #[serde(default = "default_tolerance_minutes")]
    pub tolerance_minutes: i64,
    #[serde(default = "default_memory_ttl_secs")]
    pub memory_ttl_secs: u64,
    #[serde(default = "default_memory_max_entries")]
    pub memory_max_entries: usize,
    #[serde(default = "default_distributed_ttl_secs")]
    pub distributed_ttl_secs: u64,
    /// Confidence multiplier applied when a stale precomputed row is served
    /// as last-resort fallback.
    #[serde(default = "default_stale_confidence_factor")]
    pub stale_confidence_factor: f64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            granularity_minutes: default_granularity_minutes(),
            tolerance_minutes: default_tolerance_minutes(),
            memory_ttl_secs: default_memory_ttl_secs(),
            memory_max_entries: default_memory_max_entries(),
            distributed_ttl_secs: default_distributed_ttl_secs(),
            stale_confidence_factor: default_stale_confidence_factor(),
        }
    }
}

/// Precomputation scheduler tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Bounded fan-out of the worker pool consuming the patio x slot queue.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Spacing of precomputed time slots across the daylight window.
    #[serde(default = "default_slot_interval_minutes")]
    pub slot_interval_minutes: i64,
    /// Lifetime of precomputed rows before the expiry sweep removes them.
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Period of the background run loop (schedule upkeep + expiry sweep).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            slot_interval_minutes: default_slot_interval_minutes(),
            expiry_hours: default_expiry_hours(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Timeline service limits and window derivation tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineSettings {
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    #[serde(default = "default_min_interval_minutes")]
    pub min_interval_minutes: i64,
    /// A point belongs to a sun window when sunlit fraction x confidence
    /// meets this threshold (and the state is Sunny or Partial).
    #[serde(default = "default_window_quality_threshold")]
    pub window_quality_threshold: f64,
    #[serde(default = "default_max_windows")]
    pub max_windows: usize,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
            min_interval_minutes: default_min_interval_minutes(),
            window_quality_threshold: default_window_quality_threshold(),
            max_windows: default_max_windows(),
        }
    }
}

fn default_batch_cap() -> usize {
    100
}
fn default_search_radius_m() -> f64 {
    150.0
}
fn default_max_shadow_length_m() -> f64 {
    500.0
}
fn default_near_vertical_deg() -> f64 {
    89.5
}
fn default_w_building() -> f64 {
    0.30
}
fn default_w_geometry() -> f64 {
    0.20
}
fn default_w_solar() -> f64 {
    0.15
}
fn default_w_shadow() -> f64 {
    0.15
}
fn default_w_weather() -> f64 {
    0.20
}
fn default_missing_weather_certainty() -> f64 {
    0.5
}
fn default_reliable_threshold() -> f64 {
    0.60
}
fn default_granularity_minutes() -> i64 {
    5
}
fn default_tolerance_minutes() -> i64 {
    5
}
fn default_memory_ttl_secs() -> u64 {
    300
}
fn default_memory_max_entries() -> usize {
    10_000
}
fn default_distributed_ttl_secs() -> u64 {
    1_800
}
fn default_stale_confidence_factor() -> f64 {
    0.7
}
fn default_worker_count() -> usize {
    4
}
fn default_slot_interval_minutes() -> i64 {
    60
}
fn default_expiry_hours() -> i64 {
    48
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    100
}
fn default_sweep_interval_secs() -> u64 {
    3_600
}
fn default_max_points() -> usize {
    500
}
fn default_min_interval_minutes() -> i64 {
    5
}
fn default_window_quality_threshold() -> f64 {
    0.3
}
fn default_max_windows() -> usize {
    5
}

impl CoreConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            CoreError::InvalidArgument(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: CoreConfig = toml::from_str(content)
            .map_err(|e| CoreError::InvalidArgument(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if !(-90.0..=90.0).contains(&self.location.latitude)
            || !(-180.0..=180.0).contains(&self.location.longitude)
        {
            return Err(CoreError::InvalidArgument(
                "location coordinates out of range".into(),
            ));
        }
        if self.exposure.batch_cap == 0 {
            return Err(CoreError::InvalidArgument("batch_cap must be > 0".into()));
        }
        if self.scheduler.worker_count == 0 {
            return Err(CoreError::InvalidArgument(
                "worker_count must be > 0".into(),
            ));
        }
        if self.scheduler.slot_interval_minutes <= 0 || self.timeline.min_interval_minutes <= 0 {
            return Err(CoreError::InvalidArgument(
                "intervals must be positive".into(),
            ));
        }
        let weight_sum = self.confidence.building
            + self.confidence.geometry
            + self.confidence.solar
            + self.confidence.shadow
            + self.confidence.weather;
        if weight_sum <= 0.0 {
            return Err(CoreError::InvalidArgument(
                "confidence weights must sum to a positive value".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.exposure.batch_cap, 100);
        assert_eq!(config.cache.tolerance_minutes, 5);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = CoreConfig::from_toml_str(
            r#"
            [location]
            latitude = 57.7089
            longitude = 11.9746

            [scheduler]
            worker_count = 8
            "#,
        )
        .unwrap();

        assert!((config.location.latitude - 57.7089).abs() < 1e-9);
        assert_eq!(config.scheduler.worker_count, 8);
        // Untouched sections keep their defaults.
        assert_eq!(config.exposure.batch_cap, 100);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let result = CoreConfig::from_toml_str(
            r#"
            [confidence]
            building = 0.0
            geometry = 0.0
            solar = 0.0
            shadow = 0.0
            weather = 0.0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_batch_cap_rejected() {
        let result = CoreConfig::from_toml_str("[exposure]\nbatch_cap = 0\n");
        assert!(result.is_err());
    }
}
