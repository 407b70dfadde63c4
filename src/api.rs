//! Public API surface for the sun exposure engine.
//!
//! This file consolidates the core domain types shared across services,
//! cache layers, the precomputation scheduler and the HTTP layer. All
//! serializable types derive Serialize/Deserialize for JSON transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Patio identifier (database primary key).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatioId(pub i64);

/// Building identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildingId(pub i64);

/// Venue identifier. Patios reference venues by id only; there is no
/// back-navigation from venue to patio inside the core.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueId(pub i64);

impl PatioId {
    pub fn new(value: i64) -> Self {
        PatioId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl BuildingId {
    pub fn new(value: i64) -> Self {
        BuildingId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl VenueId {
    pub fn new(value: i64) -> Self {
        VenueId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for PatioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for BuildingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A geographic point in degrees, validated on construction.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    /// Create a location, rejecting out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> CoreResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !latitude.is_finite() {
            return Err(CoreError::InvalidArgument(format!(
                "latitude {} outside [-90, 90]",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) || !longitude.is_finite() {
            return Err(CoreError::InvalidArgument(format!(
                "longitude {} outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Computed solar position for one place and instant. Immutable value;
/// `elevation_deg <= 0` means the sun is below the horizon.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarPosition {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Compass bearing of the sun in degrees, clockwise from north.
    pub azimuth_deg: f64,
    /// Angle above the horizon in degrees.
    pub elevation_deg: f64,
    pub declination_deg: f64,
}

/// Provenance of a building height value, carried through to confidence
/// scoring (surveyed heights are trusted more than defaults).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightSource {
    Lidar,
    Estimated,
    Manual,
    Default,
}

/// A building footprint with height, owned by the import subsystem and
/// read-only to the core.
#[derive(Debug, Clone)]
pub struct Building {
    pub id: BuildingId,
    pub footprint: geo::Polygon<f64>,
    pub height_m: f64,
    pub height_source: HeightSource,
    /// Data-quality score in [0, 1].
    pub data_quality: f64,
}

/// An outdoor seating area belonging to a venue.
#[derive(Debug, Clone)]
pub struct Patio {
    pub id: PatioId,
    pub venue_id: VenueId,
    pub footprint: geo::Polygon<f64>,
    pub height_m: f64,
    /// Polygon-quality score in [0, 1].
    pub polygon_quality: f64,
}

/// Ground-plane shadow cast by one building at one solar position.
/// Ephemeral: computed per request, never persisted standalone.
#[derive(Debug, Clone)]
pub struct ShadowProjection {
    pub building_id: BuildingId,
    pub polygon: geo::Polygon<f64>,
    /// Solar elevation at the time of projection, kept for validity checks.
    pub solar_elevation_deg: f64,
}

/// Categorical exposure state derived from sunlit percentage and solar
/// elevation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureState {
    Sunny,
    Partial,
    Shaded,
    NoSun,
}

/// Breakdown of the factors feeding the overall confidence value.
/// All factors are in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub building_data_quality: f64,
    pub geometry_precision: f64,
    pub solar_accuracy: f64,
    pub shadow_accuracy: f64,
    pub weather_certainty: f64,
    /// False when no weather observation was available; the weather factor
    /// is then a fixed penalty rather than a measurement.
    pub weather_available: bool,
    /// Weighted overall confidence in [0, 1].
    pub overall: f64,
}

impl ConfidenceFactors {
    /// Display score on the 0-100 scale.
    pub fn score(&self) -> u8 {
        (self.overall * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Canonical exposure record for one patio at one timestamp.
///
/// Invariants: `sunlit_pct + shaded_pct == 100` within 0.01, and the state
/// is `NoSun` with `sunlit_pct == 0` whenever solar elevation is <= 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatioSunExposure {
    pub patio_id: PatioId,
    pub timestamp: DateTime<Utc>,
    pub sunlit_pct: f64,
    pub shaded_pct: f64,
    pub state: ExposureState,
    /// Overall confidence in [0, 1]; display as 0-100 via `confidence_score`.
    pub confidence: f64,
    pub solar: SolarPosition,
    pub factors: ConfidenceFactors,
    pub computation_ms: u64,
}

impl PatioSunExposure {
    pub fn confidence_score(&self) -> u8 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Latest weather snapshot consumed from the weather collaborator.
/// Absence of a snapshot only degrades confidence, it is never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherObservation {
    /// Cloud cover fraction in [0, 1].
    pub cloud_cover: f64,
    pub visibility_km: f64,
    pub source: String,
    pub observed_at: DateTime<Utc>,
}

/// Version stamped on every precomputed row. Bump when the shadow or
/// confidence model changes so old rows can be recognized and re-derived.
pub const ALGORITHM_VERSION: i32 = 1;

/// Durable projection of an exposure record produced by the precomputation
/// scheduler. Rows are marked stale when upstream inputs change and only
/// physically removed by the expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputedSunExposure {
    pub exposure: PatioSunExposure,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub algorithm_version: i32,
    pub is_stale: bool,
}

/// Status of a per-date precomputation schedule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Running,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl ScheduleStatus {
    /// Completed and Failed are terminal; PartiallyCompleted may be retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Failed)
    }
}

/// One failed patio/time-slot pair inside a precomputation run, retained
/// for retry and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotFailure {
    pub patio_id: PatioId,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Execution metrics for a precomputation schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleMetrics {
    pub patios_processed: usize,
    pub slots_written: usize,
    pub duration_ms: u64,
    pub errors: Vec<SlotFailure>,
}

/// Per-date job record tracking bulk advance computation of exposure for
/// all patios. One schedule exists per target date; it is created Pending,
/// mutated in place while running, and terminal once Completed/Failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputationSchedule {
    pub target_date: chrono::NaiveDate,
    pub status: ScheduleStatus,
    pub metrics: ScheduleMetrics,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PrecomputationSchedule {
    pub fn pending(target_date: chrono::NaiveDate) -> Self {
        Self {
            target_date,
            status: ScheduleStatus::Pending,
            metrics: ScheduleMetrics::default(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Failure marker for one patio inside a batch request. Single-item
/// failures never abort the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemFailure {
    pub patio_id: PatioId,
    pub reason: String,
}

/// Result of a batch exposure computation: successes keyed by patio id
/// plus per-item failure markers. Output ordering is not guaranteed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchExposureResult {
    pub results: std::collections::HashMap<PatioId, PatioSunExposure>,
    pub failures: Vec<BatchItemFailure>,
}

/// Cooperative cancellation flag propagated from request/job contexts down
/// through batch loops. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Error taxonomy for the core. Stale data is deliberately *not* an error:
/// serving stale precomputed rows is a signalled degraded-confidence
/// success handled by the cache layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Unknown patio/building/venue id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Out-of-range coordinates, inverted time ranges, exceeded limits.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Degenerate or self-intersecting geometry, numeric trouble in the
    /// shadow projection. Batch operations capture this per item.
    #[error("computation failure: {0}")]
    ComputationFailure(String),

    /// A collaborator (weather, distributed cache) is unavailable. Callers
    /// degrade confidence rather than failing the request.
    #[error("external dependency degraded: {0}")]
    ExternalDependencyDegraded(String),

    /// The surrounding request or job context was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Repository(#[from] crate::db::RepositoryError),
}

impl CoreError {
    /// Short machine-readable kind, used in batch failure markers and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::InvalidArgument(_) => "invalid_argument",
            CoreError::ComputationFailure(_) => "computation_failure",
            CoreError::ExternalDependencyDegraded(_) => "dependency_degraded",
            CoreError::Cancelled(_) => "cancelled",
            CoreError::Repository(_) => "repository",
        }
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;
