//! Multi-layer exposure cache.
//!
//! Ordered fallback chain for exposure reads: process-local memory, then
//! the distributed cache shared across instances, then the durable
//! precomputed store, then on-demand computation. Misses back-fill every
//! layer above on the way out. A distributed outage degrades the chain
//! to memory plus precomputed plus compute instead of failing reads.

pub mod distributed;
pub mod layered;
pub mod memory;

pub use distributed::{DistributedCache, LocalDistributedCache};
pub use layered::LayeredCache;
pub use memory::MemoryCache;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use crate::api::PatioId;

/// Cache key: patio plus timestamp rounded to the configured granularity.
/// Rounding keeps nearby request timestamps hitting the same entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub patio_id: PatioId,
    pub slot: DateTime<Utc>,
}

impl CacheKey {
    pub fn for_timestamp(
        patio_id: PatioId,
        timestamp: DateTime<Utc>,
        granularity_minutes: i64,
    ) -> Self {
        let granularity = Duration::minutes(granularity_minutes.max(1));
        let slot = timestamp
            .duration_round(granularity)
            .unwrap_or(timestamp);
        Self { patio_id, slot }
    }
}

/// Which layer satisfied a read.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    Memory,
    Distributed,
    Precomputed,
    Computed,
}

/// A cache read result: the exposure plus provenance. `served_stale` marks
/// the last-resort path where a stale precomputed row was returned with
/// reduced confidence because recomputation failed.
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub exposure: crate::api::PatioSunExposure,
    pub source: CacheSource,
    pub served_stale: bool,
}

/// Counters for one cache layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerMetrics {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl LayerMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Aggregated metrics across the chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub memory: LayerMetrics,
    pub distributed: LayerMetrics,
    pub precomputed: LayerMetrics,
    /// Reads that fell through every layer to on-demand computation.
    pub computed: u64,
    /// Stale rows served with reduced confidence after a compute failure.
    pub served_stale: u64,
    /// Mean end-to-end read latency across the chain.
    pub avg_read_micros: u64,
}

/// Health status of the chain as a whole.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheHealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    pub status: CacheHealthStatus,
    pub memory_entries: usize,
    pub distributed_available: bool,
    pub precomputed_available: bool,
    pub precomputed_rows: Option<usize>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::TimeZone;

    use crate::api::{
        ConfidenceFactors, ExposureState, PatioId, PatioSunExposure, SolarPosition,
    };

    use super::CacheKey;

    pub fn key_at(patio: i64, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> CacheKey {
        CacheKey {
            patio_id: PatioId::new(patio),
            slot: chrono::Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap(),
        }
    }

    pub fn exposure_fixture(
        patio: i64,
        y: i32,
        mo: u32,
        d: u32,
        h: u32,
        mi: u32,
    ) -> PatioSunExposure {
        let timestamp = chrono::Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap();
        PatioSunExposure {
            patio_id: PatioId::new(patio),
            timestamp,
            sunlit_pct: 80.0,
            shaded_pct: 20.0,
            state: ExposureState::Sunny,
            confidence: 0.85,
            solar: SolarPosition {
                timestamp,
                latitude: 57.7089,
                longitude: 11.9746,
                azimuth_deg: 180.0,
                elevation_deg: 40.0,
                declination_deg: 23.0,
            },
            factors: ConfidenceFactors {
                building_data_quality: 0.9,
                geometry_precision: 0.9,
                solar_accuracy: 0.95,
                shadow_accuracy: 0.9,
                weather_certainty: 0.7,
                weather_available: true,
                overall: 0.85,
            },
            computation_ms: 3,
        }
    }

    #[test]
    fn test_key_rounds_to_granularity() {
        let ts = chrono::Utc.with_ymd_and_hms(2024, 6, 21, 12, 3, 42).unwrap();
        let key = CacheKey::for_timestamp(PatioId::new(1), ts, 5);
        assert_eq!(key, key_at(1, 2024, 6, 21, 12, 5));

        let earlier = chrono::Utc.with_ymd_and_hms(2024, 6, 21, 12, 2, 10).unwrap();
        let key = CacheKey::for_timestamp(PatioId::new(1), earlier, 5);
        assert_eq!(key, key_at(1, 2024, 6, 21, 12, 0));
    }
}
