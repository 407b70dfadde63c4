//! Repository traits for the read-only collaborator contracts and the
//! precomputed-exposure store owned by this core.
//!
//! Building and patio geometry is owned by the import/CRUD subsystem; the
//! core only reads it, with the single exception of the explicit building
//! height-override path (which callers must follow with an invalidation,
//! see the scheduler).

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use geo::Point;

use super::error::RepositoryResult;
use crate::api::{
    Building, BuildingId, HeightSource, Patio, PatioId, PrecomputedSunExposure,
    WeatherObservation,
};

/// Read access to building footprints and heights.
#[async_trait]
pub trait BuildingRepository: Send + Sync {
    async fn building_by_id(&self, id: BuildingId) -> RepositoryResult<Option<Building>>;

    /// Buildings whose footprint envelope intersects the circle around
    /// `center`. Backed by a spatial index.
    async fn buildings_near(
        &self,
        center: Point<f64>,
        radius_m: f64,
    ) -> RepositoryResult<Vec<Building>>;

    /// Explicit height-override path. The caller is responsible for
    /// invalidating downstream precomputed data afterwards.
    async fn override_building_height(
        &self,
        id: BuildingId,
        height_m: f64,
        source: HeightSource,
    ) -> RepositoryResult<()>;
}

/// Read access to patio geometry.
#[async_trait]
pub trait PatioRepository: Send + Sync {
    async fn patio_by_id(&self, id: PatioId) -> RepositoryResult<Option<Patio>>;

    async fn patios_near(
        &self,
        center: Point<f64>,
        radius_km: f64,
    ) -> RepositoryResult<Vec<Patio>>;

    /// Full id sweep for the precomputation scheduler.
    async fn all_patio_ids(&self) -> RepositoryResult<Vec<PatioId>>;
}

/// Durable store for precomputed exposure rows, owned exclusively by this
/// core. Writes are upserts keyed by (patio id, timestamp) so scheduler
/// re-runs are idempotent.
#[async_trait]
pub trait PrecomputedRepository: Send + Sync {
    async fn upsert(&self, row: PrecomputedSunExposure) -> RepositoryResult<()>;

    /// Closest row for the patio within `tolerance` of `timestamp`,
    /// preferring fresh rows over stale ones.
    async fn find_near(
        &self,
        patio_id: PatioId,
        timestamp: DateTime<Utc>,
        tolerance: Duration,
    ) -> RepositoryResult<Option<PrecomputedSunExposure>>;

    /// Mark matching rows stale without deleting them. `date = None` marks
    /// every row for the patio. Returns the number of rows touched.
    async fn mark_stale(
        &self,
        patio_id: PatioId,
        date: Option<NaiveDate>,
    ) -> RepositoryResult<usize>;

    /// Physically remove rows past their expiry. Returns the number removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> RepositoryResult<usize>;

    /// Total number of stored rows, for cache metrics.
    async fn row_count(&self) -> RepositoryResult<usize>;
}

/// Weather collaborator. May legitimately return nothing; absence only
/// degrades confidence and is never an error.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn latest_weather(
        &self,
        timestamp: DateTime<Utc>,
    ) -> RepositoryResult<Option<WeatherObservation>>;
}

/// Convenience super-trait for backends implementing every store.
pub trait FullRepository:
    BuildingRepository + PatioRepository + PrecomputedRepository + Send + Sync
{
}

impl<T> FullRepository for T where
    T: BuildingRepository + PatioRepository + PrecomputedRepository + Send + Sync
{
}
