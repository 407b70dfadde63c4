//! Data Transfer Objects for the HTTP API.
//!
//! Core records (exposure, solar position, schedules, cache reports)
//! already derive Serialize and cross the wire as-is; the DTOs here cover
//! request shapes and the geometry-bearing responses, where footprint
//! polygons are flattened to coordinate arrays.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use crate::api::{
    BatchItemFailure, HeightSource, PatioSunExposure, PrecomputationSchedule, SolarPosition,
};
pub use crate::cache::{CacheHealth, CacheMetrics, CacheSource};
pub use crate::services::timeline::{PatioRanking, SunWindow, TimelinePoint};

/// Exterior-ring coordinates of a polygon as `[lon, lat]` pairs.
pub fn polygon_coords(polygon: &geo::Polygon<f64>) -> Vec<[f64; 2]> {
    polygon.exterior().0.iter().map(|c| [c.x, c.y]).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cache: CacheHealth,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolarPositionQuery {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimestampQuery {
    pub timestamp: DateTime<Utc>,
}

/// One building shadow, footprint flattened for transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowDto {
    pub building_id: i64,
    pub polygon: Vec<[f64; 2]>,
    pub solar_elevation_deg: f64,
}

/// Shadow picture over one patio at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatioShadowResponse {
    pub patio_id: i64,
    pub timestamp: DateTime<Utc>,
    pub solar: SolarPosition,
    pub sunlit_pct: f64,
    pub shaded_pct: f64,
    pub shadows: Vec<ShadowDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchShadowRequest {
    pub patio_ids: Vec<i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchShadowResponse {
    pub results: HashMap<i64, PatioShadowResponse>,
    pub failures: Vec<BatchItemFailure>,
}

/// Coverage-only timeline point for the shadow timeline endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowTimelinePoint {
    pub timestamp: DateTime<Utc>,
    pub sunlit_pct: f64,
    pub shaded_pct: f64,
    pub solar_elevation_deg: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RangeQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SunWindowsQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval_minutes: i64,
    pub max_windows: Option<usize>,
}

/// Exposure plus cache provenance so clients can hedge degraded results.
#[derive(Debug, Clone, Serialize)]
pub struct ExposureResponse {
    pub exposure: PatioSunExposure,
    pub source: CacheSource,
    pub served_stale: bool,
    pub reliable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchExposureRequest {
    pub patio_ids: Vec<i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchExposureResponse {
    pub results: HashMap<i64, PatioSunExposure>,
    pub failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompareRequest {
    pub patio_ids: Vec<i64>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareResponse {
    /// Best first.
    pub rankings: Vec<PatioRanking>,
    pub best: Option<PatioRanking>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateQuery {
    /// Restrict invalidation to rows on this date.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub rows_marked: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeightOverrideRequest {
    pub height_m: f64,
    pub source: HeightSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeightOverrideResponse {
    pub building_id: i64,
    /// Precomputed rows invalidated as a consequence of the change.
    pub rows_marked: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    pub schedule: PrecomputationSchedule,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarmRequest {
    pub patio_ids: Vec<i64>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarmResponse {
    pub slots_warmed: usize,
}
