//! Per-date precomputation of the patio x time-slot grid.
//!
//! Each target date gets one schedule record walking the state machine
//! Pending -> Running -> {Completed | PartiallyCompleted | Failed}. Slots
//! cover the daylight window at the configured slot interval; workers
//! write rows through upsert so re-runs are idempotent. Schedule state is
//! kept in-process behind a lock; only one Running schedule per date is
//! permitted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::api::{
    BuildingId, CancelToken, CoreError, CoreResult, PatioId, PrecomputationSchedule,
    PrecomputedSunExposure, ScheduleStatus, SlotFailure, ALGORITHM_VERSION,
};
use crate::cache::LayeredCache;
use crate::config::CoreConfig;
use crate::db::repository::{BuildingRepository, PatioRepository, PrecomputedRepository};
use crate::geo_util;
use crate::services::exposure::ExposureEngine;
use crate::services::solar;

pub struct PrecomputationScheduler {
    engine: Arc<ExposureEngine>,
    patios: Arc<dyn PatioRepository>,
    buildings: Arc<dyn BuildingRepository>,
    precomputed: Arc<dyn PrecomputedRepository>,
    cache: Arc<LayeredCache>,
    config: CoreConfig,
    schedules: RwLock<HashMap<NaiveDate, PrecomputationSchedule>>,
}

impl PrecomputationScheduler {
    pub fn new(
        engine: Arc<ExposureEngine>,
        patios: Arc<dyn PatioRepository>,
        buildings: Arc<dyn BuildingRepository>,
        precomputed: Arc<dyn PrecomputedRepository>,
        cache: Arc<LayeredCache>,
    ) -> Self {
        let config = engine.config().clone();
        Self {
            engine,
            patios,
            buildings,
            precomputed,
            cache,
            config,
            schedules: RwLock::new(HashMap::new()),
        }
    }

    /// Create a Pending schedule for a date. Idempotent: an existing
    /// schedule of any status is returned untouched, so a duplicate call
    /// never wipes a finished date's record. Re-runs go through
    /// `reschedule`.
    pub fn schedule(&self, date: NaiveDate) -> PrecomputationSchedule {
        let mut schedules = self.schedules.write();
        match schedules.get(&date) {
            Some(existing) => existing.clone(),
            None => {
                let fresh = PrecomputationSchedule::pending(date);
                schedules.insert(date, fresh.clone());
                fresh
            }
        }
    }

    /// Reset a terminal date back to Pending so it can be recomputed,
    /// discarding the previous record and its metrics. Refused while a run
    /// is in flight.
    pub fn reschedule(&self, date: NaiveDate) -> CoreResult<PrecomputationSchedule> {
        let mut schedules = self.schedules.write();
        if let Some(existing) = schedules.get(&date) {
            if existing.status == ScheduleStatus::Running {
                return Err(CoreError::InvalidArgument(format!(
                    "schedule for {} is already running",
                    date
                )));
            }
        }
        let fresh = PrecomputationSchedule::pending(date);
        schedules.insert(date, fresh.clone());
        Ok(fresh)
    }

    pub fn status(&self, date: NaiveDate) -> Option<PrecomputationSchedule> {
        self.schedules.read().get(&date).cloned()
    }

    /// Run the full grid for one date. Creates the schedule if absent,
    /// refuses a date that is already Running, and returns the existing
    /// record unchanged when the date already Completed.
    pub async fn execute(
        &self,
        date: NaiveDate,
        cancel: &CancelToken,
    ) -> CoreResult<PrecomputationSchedule> {
        {
            let mut schedules = self.schedules.write();
            match schedules.get_mut(&date) {
                Some(s) if s.status == ScheduleStatus::Running => {
                    return Err(CoreError::InvalidArgument(format!(
                        "schedule for {} is already running",
                        date
                    )));
                }
                Some(s) if s.status == ScheduleStatus::Completed => {
                    return Ok(s.clone());
                }
                Some(s) => {
                    s.status = ScheduleStatus::Running;
                    s.started_at = Some(Utc::now());
                }
                None => {
                    let mut fresh = PrecomputationSchedule::pending(date);
                    fresh.status = ScheduleStatus::Running;
                    fresh.started_at = Some(Utc::now());
                    schedules.insert(date, fresh);
                }
            }
        }

        let outcome = self.run_grid(date, cancel).await;
        let finished = {
            let mut schedules = self.schedules.write();
            let record = schedules
                .entry(date)
                .or_insert_with(|| PrecomputationSchedule::pending(date));
            match outcome {
                Ok((status, metrics)) => {
                    record.status = status;
                    record.metrics = metrics;
                }
                Err(ref e) => {
                    record.status = ScheduleStatus::Failed;
                    warn!("precomputation for {} failed outright: {}", date, e);
                }
            }
            record.finished_at = Some(Utc::now());
            record.clone()
        };
        info!(
            "precomputation for {} finished as {:?}: {} slots written, {} errors",
            date,
            finished.status,
            finished.metrics.slots_written,
            finished.metrics.errors.len()
        );
        Ok(finished)
    }

    async fn run_grid(
        &self,
        date: NaiveDate,
        cancel: &CancelToken,
    ) -> CoreResult<(ScheduleStatus, crate::api::ScheduleMetrics)> {
        let started = Instant::now();
        let slots = self.daylight_slots(date)?;
        let patio_ids = self.patios.all_patio_ids().await?;

        let work: Vec<(PatioId, DateTime<Utc>)> = patio_ids
            .iter()
            .flat_map(|&p| slots.iter().map(move |&s| (p, s)))
            .collect();

        let results: Vec<Result<PatioId, SlotFailure>> = futures::stream::iter(work)
            .map(|(patio_id, slot)| self.compute_slot(patio_id, slot, cancel))
            .buffer_unordered(self.config.scheduler.worker_count.max(1))
            .collect()
            .await;

        let mut slots_written = 0;
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(_) => slots_written += 1,
                Err(failure) => errors.push(failure),
            }
        }

        let status = if errors.is_empty() {
            ScheduleStatus::Completed
        } else if slots_written == 0 {
            ScheduleStatus::Failed
        } else {
            ScheduleStatus::PartiallyCompleted
        };

        Ok((
            status,
            crate::api::ScheduleMetrics {
                patios_processed: patio_ids.len(),
                slots_written,
                duration_ms: started.elapsed().as_millis() as u64,
                errors,
            },
        ))
    }

    /// One unit of grid work: compute and persist a single patio/slot pair,
    /// retrying transient repository failures with a fixed delay.
    async fn compute_slot(
        &self,
        patio_id: PatioId,
        slot: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<PatioId, SlotFailure> {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SlotFailure {
                    patio_id,
                    timestamp: slot,
                    reason: "cancelled".into(),
                });
            }

            let result = self.compute_and_persist(patio_id, slot, cancel).await;
            match result {
                Ok(()) => return Ok(patio_id),
                Err(e) if attempt < self.config.scheduler.max_retries && is_transient(&e) => {
                    attempt += 1;
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.config.scheduler.retry_delay_ms * attempt as u64,
                    ))
                    .await;
                }
                Err(e) => {
                    return Err(SlotFailure {
                        patio_id,
                        timestamp: slot,
                        reason: format!("{}: {}", e.kind(), e),
                    });
                }
            }
        }
    }

    async fn compute_and_persist(
        &self,
        patio_id: PatioId,
        slot: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> CoreResult<()> {
        let exposure = self.engine.exposure(patio_id, slot, cancel).await?;
        let now = Utc::now();
        let row = PrecomputedSunExposure {
            exposure,
            computed_at: now,
            expires_at: now + Duration::hours(self.config.scheduler.expiry_hours),
            algorithm_version: ALGORITHM_VERSION,
            is_stale: false,
        };
        self.precomputed.upsert(row).await?;
        Ok(())
    }

    /// Time slots covering the daylight window of a date at the configured
    /// interval. Polar day yields the full day; polar night yields nothing.
    fn daylight_slots(&self, date: NaiveDate) -> CoreResult<Vec<DateTime<Utc>>> {
        let lat = self.config.location.latitude;
        let lon = self.config.location.longitude;
        let interval = Duration::minutes(self.config.scheduler.slot_interval_minutes.max(1));

        let (start, end) = match solar::sunrise_sunset(date, lat, lon)? {
            Some(window) => window,
            None => {
                let noon = solar::solar_noon(date, lat, lon)?;
                let position = solar::solar_position(noon, lat, lon)?;
                if !solar::is_sun_visible(&position) {
                    return Ok(Vec::new());
                }
                let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).ok_or_else(
                    || CoreError::InvalidArgument(format!("invalid date {}", date)),
                )?);
                (midnight, midnight + Duration::days(1) - interval)
            }
        };

        let mut slots = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            slots.push(cursor);
            cursor += interval;
        }
        Ok(slots)
    }

    /// Mark precomputed rows for a patio stale and drop the volatile cache
    /// layers. Rows stay servable as degraded fallbacks until the sweep.
    pub async fn invalidate(
        &self,
        patio_id: PatioId,
        date: Option<NaiveDate>,
    ) -> CoreResult<usize> {
        self.cache.invalidate(patio_id, date).await
    }

    /// A building changed (typically its height): invalidate every patio
    /// whose shadow-casting radius could include it.
    pub async fn invalidate_for_building_change(
        &self,
        building_id: BuildingId,
    ) -> CoreResult<usize> {
        let building = self
            .buildings
            .building_by_id(building_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("building {}", building_id)))?;

        let center = geo_util::polygon_centroid(&building.footprint);
        let radius_km = self.config.shadow.search_radius_m / 1000.0;
        let affected = self.patios.patios_near(center, radius_km).await?;

        let mut marked = 0;
        for patio in affected {
            marked += self.cache.invalidate(patio.id, None).await?;
        }
        Ok(marked)
    }

    /// Physically delete rows past their expiry. Returns the number removed.
    pub async fn cleanup_expired(&self) -> CoreResult<usize> {
        let removed = self.precomputed.delete_expired(Utc::now()).await?;
        if removed > 0 {
            info!("expiry sweep removed {} precomputed rows", removed);
        }
        Ok(removed)
    }

    /// Background upkeep loop: keeps today and tomorrow scheduled and
    /// executed, and sweeps expired rows. Runs until the token cancels.
    pub async fn run(&self, cancel: CancelToken) {
        let sweep = std::time::Duration::from_secs(self.config.scheduler.sweep_interval_secs.max(1));
        while !cancel.is_cancelled() {
            let today = Utc::now().date_naive();
            for date in [today, today + Duration::days(1)] {
                let record = self.schedule(date);
                if record.status == ScheduleStatus::Pending
                    || record.status == ScheduleStatus::PartiallyCompleted
                {
                    if let Err(e) = self.execute(date, &cancel).await {
                        warn!("scheduled run for {} not started: {}", date, e);
                    }
                }
            }
            if let Err(e) = self.cleanup_expired().await {
                warn!("expiry sweep failed: {}", e);
            }

            tokio::select! {
                _ = tokio::time::sleep(sweep) => {}
                _ = wait_cancelled(&cancel) => break,
            }
        }
    }
}

fn is_transient(error: &CoreError) -> bool {
    matches!(error, CoreError::Repository(e) if e.is_retryable())
}

async fn wait_cancelled(cancel: &CancelToken) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}
