//! In-memory repository implementation for unit testing and local
//! development.
//!
//! Building and patio footprints are indexed in R-trees so the
//! `*_near` lookups behave like the production spatial queries: envelope
//! intersection first, then a centroid distance filter.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use geo::Point;
use parking_lot::RwLock;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;

use super::super::error::{ErrorContext, RepositoryError, RepositoryResult};
use super::super::repository::{
    BuildingRepository, PatioRepository, PrecomputedRepository, WeatherProvider,
};
use crate::api::{
    Building, BuildingId, HeightSource, Patio, PatioId, PrecomputedSunExposure,
    WeatherObservation,
};
use crate::geo_util;

/// A footprint envelope stored in the R-tree with the id of its entity.
struct SpatialEntry {
    id: i64,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

#[derive(Default)]
struct Inner {
    buildings: HashMap<BuildingId, Building>,
    patios: HashMap<PatioId, Patio>,
    building_index: RTree<SpatialEntry>,
    patio_index: RTree<SpatialEntry>,
    /// Keyed by (patio id, unix timestamp seconds) for upsert idempotency.
    precomputed: HashMap<(PatioId, i64), PrecomputedSunExposure>,
}

/// In-memory implementation of every repository trait.
#[derive(Default)]
pub struct LocalRepository {
    inner: RwLock<Inner>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a building (test/local setup path).
    pub fn insert_building(&self, building: Building) {
        let mut inner = self.inner.write();
        inner.building_index.insert(SpatialEntry {
            id: building.id.value(),
            envelope: geo_util::polygon_envelope(&building.footprint),
        });
        inner.buildings.insert(building.id, building);
    }

    /// Seed a patio (test/local setup path).
    pub fn insert_patio(&self, patio: Patio) {
        let mut inner = self.inner.write();
        inner.patio_index.insert(SpatialEntry {
            id: patio.id.value(),
            envelope: geo_util::polygon_envelope(&patio.footprint),
        });
        inner.patios.insert(patio.id, patio);
    }

    /// Number of precomputed rows currently stored.
    pub fn precomputed_len(&self) -> usize {
        self.inner.read().precomputed.len()
    }

    /// Direct row lookup for tests.
    pub fn precomputed_row(
        &self,
        patio_id: PatioId,
        timestamp: DateTime<Utc>,
    ) -> Option<PrecomputedSunExposure> {
        self.inner
            .read()
            .precomputed
            .get(&(patio_id, timestamp.timestamp()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl BuildingRepository for LocalRepository {
    async fn building_by_id(&self, id: BuildingId) -> RepositoryResult<Option<Building>> {
        Ok(self.inner.read().buildings.get(&id).cloned())
    }

    async fn buildings_near(
        &self,
        center: Point<f64>,
        radius_m: f64,
    ) -> RepositoryResult<Vec<Building>> {
        let inner = self.inner.read();
        let query_env = geo_util::search_envelope(center, radius_m);

        let mut found = Vec::new();
        for entry in inner
            .building_index
            .locate_in_envelope_intersecting(&query_env)
        {
            if let Some(building) = inner.buildings.get(&BuildingId::new(entry.id)) {
                let centroid = geo_util::polygon_centroid(&building.footprint);
                if geo_util::approx_distance_m(center, centroid) <= radius_m {
                    found.push(building.clone());
                }
            }
        }
        Ok(found)
    }

    async fn override_building_height(
        &self,
        id: BuildingId,
        height_m: f64,
        source: HeightSource,
    ) -> RepositoryResult<()> {
        if height_m < 0.0 || !height_m.is_finite() {
            return Err(RepositoryError::validation(
                format!("invalid height {}", height_m),
                ErrorContext::new("override_building_height").with_entity_id(id),
            ));
        }

        let mut inner = self.inner.write();
        match inner.buildings.get_mut(&id) {
            Some(building) => {
                building.height_m = height_m;
                building.height_source = source;
                Ok(())
            }
            None => Err(RepositoryError::not_found(
                format!("building {}", id),
                ErrorContext::new("override_building_height")
                    .with_entity("building")
                    .with_entity_id(id),
            )),
        }
    }
}

#[async_trait::async_trait]
impl PatioRepository for LocalRepository {
    async fn patio_by_id(&self, id: PatioId) -> RepositoryResult<Option<Patio>> {
        Ok(self.inner.read().patios.get(&id).cloned())
    }

    async fn patios_near(
        &self,
        center: Point<f64>,
        radius_km: f64,
    ) -> RepositoryResult<Vec<Patio>> {
        let radius_m = radius_km * 1000.0;
        let inner = self.inner.read();
        let query_env = geo_util::search_envelope(center, radius_m);

        let mut found = Vec::new();
        for entry in inner
            .patio_index
            .locate_in_envelope_intersecting(&query_env)
        {
            if let Some(patio) = inner.patios.get(&PatioId::new(entry.id)) {
                let centroid = geo_util::polygon_centroid(&patio.footprint);
                if geo_util::approx_distance_m(center, centroid) <= radius_m {
                    found.push(patio.clone());
                }
            }
        }
        Ok(found)
    }

    async fn all_patio_ids(&self) -> RepositoryResult<Vec<PatioId>> {
        let mut ids: Vec<PatioId> = self.inner.read().patios.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl PrecomputedRepository for LocalRepository {
    async fn upsert(&self, row: PrecomputedSunExposure) -> RepositoryResult<()> {
        if row.expires_at <= row.computed_at {
            return Err(RepositoryError::validation(
                "expires_at must be after computed_at",
                ErrorContext::new("upsert_precomputed")
                    .with_entity("precomputed")
                    .with_entity_id(row.exposure.patio_id),
            ));
        }

        let key = (row.exposure.patio_id, row.exposure.timestamp.timestamp());
        self.inner.write().precomputed.insert(key, row);
        Ok(())
    }

    async fn find_near(
        &self,
        patio_id: PatioId,
        timestamp: DateTime<Utc>,
        tolerance: Duration,
    ) -> RepositoryResult<Option<PrecomputedSunExposure>> {
        let inner = self.inner.read();
        let target = timestamp.timestamp();
        let window = tolerance.num_seconds().abs();

        // Closest fresh row wins; stale rows are only returned when no
        // fresh row matches the window.
        let mut best_fresh: Option<(i64, &PrecomputedSunExposure)> = None;
        let mut best_stale: Option<(i64, &PrecomputedSunExposure)> = None;

        for ((pid, ts), row) in inner.precomputed.iter() {
            if *pid != patio_id {
                continue;
            }
            let distance = (ts - target).abs();
            if distance > window {
                continue;
            }
            let slot = if row.is_stale {
                &mut best_stale
            } else {
                &mut best_fresh
            };
            if slot.map_or(true, |(d, _)| distance < d) {
                *slot = Some((distance, row));
            }
        }

        Ok(best_fresh
            .or(best_stale)
            .map(|(_, row)| row.clone()))
    }

    async fn mark_stale(
        &self,
        patio_id: PatioId,
        date: Option<NaiveDate>,
    ) -> RepositoryResult<usize> {
        let mut inner = self.inner.write();
        let mut touched = 0;
        for ((pid, _), row) in inner.precomputed.iter_mut() {
            if *pid != patio_id {
                continue;
            }
            if let Some(date) = date {
                if row.exposure.timestamp.date_naive() != date {
                    continue;
                }
            }
            if !row.is_stale {
                row.is_stale = true;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> RepositoryResult<usize> {
        let mut inner = self.inner.write();
        let before = inner.precomputed.len();
        inner.precomputed.retain(|_, row| row.expires_at > now);
        Ok(before - inner.precomputed.len())
    }

    async fn row_count(&self) -> RepositoryResult<usize> {
        Ok(self.inner.read().precomputed.len())
    }
}

/// Weather provider backed by a single settable observation. Used in local
/// development and tests; flipping `set_available(false)` simulates a
/// provider outage.
#[derive(Default)]
pub struct StaticWeatherProvider {
    observation: RwLock<Option<WeatherObservation>>,
    available: std::sync::atomic::AtomicBool,
}

impl StaticWeatherProvider {
    pub fn new() -> Self {
        Self {
            observation: RwLock::new(None),
            available: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn set_observation(&self, observation: Option<WeatherObservation>) {
        *self.observation.write() = observation;
    }

    pub fn set_available(&self, available: bool) {
        self.available
            .store(available, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl WeatherProvider for StaticWeatherProvider {
    async fn latest_weather(
        &self,
        _timestamp: DateTime<Utc>,
    ) -> RepositoryResult<Option<WeatherObservation>> {
        if !self.available.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RepositoryError::connection(
                "weather provider unavailable",
                ErrorContext::new("latest_weather").retryable(),
            ));
        }
        Ok(self.observation.read().clone())
    }
}
