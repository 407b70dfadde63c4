//! The ordered cache chain.
//!
//! Reads walk Memory -> Distributed -> Precomputed -> on-demand compute
//! and back-fill the layers above on the way out. Layer failures are
//! absorbed: a distributed outage or a precomputed-store error turns into
//! a counter bump and a fall-through, never a failed read. The only
//! error surfaced to callers is a compute failure with no stale fallback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::api::{
    CancelToken, CoreError, CoreResult, PatioId, PatioSunExposure, PrecomputedSunExposure,
    ALGORITHM_VERSION,
};
use crate::cache::{
    CacheHealth, CacheHealthStatus, CacheKey, CacheMetrics, CacheOutcome, CacheSource,
    DistributedCache, LayerMetrics, MemoryCache,
};
use crate::config::CacheSettings;
use crate::db::repository::PrecomputedRepository;
use crate::services::exposure::ExposureEngine;

pub struct LayeredCache {
    memory: MemoryCache,
    distributed: Arc<dyn DistributedCache>,
    precomputed: Arc<dyn PrecomputedRepository>,
    engine: Arc<ExposureEngine>,
    settings: CacheSettings,
    precompute_expiry: Duration,

    distributed_hits: AtomicU64,
    distributed_misses: AtomicU64,
    distributed_errors: AtomicU64,
    precomputed_hits: AtomicU64,
    precomputed_misses: AtomicU64,
    precomputed_errors: AtomicU64,
    computed: AtomicU64,
    served_stale: AtomicU64,
    read_count: AtomicU64,
    read_micros: AtomicU64,
}

impl LayeredCache {
    pub fn new(
        distributed: Arc<dyn DistributedCache>,
        precomputed: Arc<dyn PrecomputedRepository>,
        engine: Arc<ExposureEngine>,
    ) -> Self {
        let settings = engine.config().cache.clone();
        let precompute_expiry = Duration::hours(engine.config().scheduler.expiry_hours);
        Self {
            memory: MemoryCache::new(
                StdDuration::from_secs(settings.memory_ttl_secs),
                settings.memory_max_entries,
            ),
            distributed,
            precomputed,
            engine,
            settings,
            precompute_expiry,
            distributed_hits: AtomicU64::new(0),
            distributed_misses: AtomicU64::new(0),
            distributed_errors: AtomicU64::new(0),
            precomputed_hits: AtomicU64::new(0),
            precomputed_misses: AtomicU64::new(0),
            precomputed_errors: AtomicU64::new(0),
            computed: AtomicU64::new(0),
            served_stale: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            read_micros: AtomicU64::new(0),
        }
    }

    /// Read one exposure through the chain, back-filling on miss. The
    /// token aborts the read before the layer walk and again before any
    /// on-demand compute.
    pub async fn get(
        &self,
        patio_id: PatioId,
        timestamp: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> CoreResult<CacheOutcome> {
        let started = std::time::Instant::now();
        let outcome = self.get_inner(patio_id, timestamp, cancel).await;
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.read_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        outcome
    }

    async fn get_inner(
        &self,
        patio_id: PatioId,
        timestamp: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> CoreResult<CacheOutcome> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled("cache read aborted".into()));
        }
        let key = CacheKey::for_timestamp(patio_id, timestamp, self.settings.granularity_minutes);

        if let Some(exposure) = self.memory.get(&key) {
            return Ok(CacheOutcome {
                exposure,
                source: CacheSource::Memory,
                served_stale: false,
            });
        }

        match self.distributed.get(&key).await {
            Ok(Some(exposure)) => {
                self.distributed_hits.fetch_add(1, Ordering::Relaxed);
                self.memory.insert(key, exposure.clone());
                return Ok(CacheOutcome {
                    exposure,
                    source: CacheSource::Distributed,
                    served_stale: false,
                });
            }
            Ok(None) => {
                self.distributed_misses.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.distributed_errors.fetch_add(1, Ordering::Relaxed);
                warn!("distributed cache read failed, falling through: {}", e);
            }
        }

        // Precomputed rows within the tolerance window count as a match;
        // stale rows are only kept as a fallback for compute failure.
        let mut stale_fallback: Option<PrecomputedSunExposure> = None;
        let tolerance = Duration::minutes(self.settings.tolerance_minutes);
        match self.precomputed.find_near(patio_id, key.slot, tolerance).await {
            Ok(Some(row)) if !row.is_stale && row.expires_at > Utc::now() => {
                self.precomputed_hits.fetch_add(1, Ordering::Relaxed);
                self.memory.insert(key, row.exposure.clone());
                self.backfill_distributed(key, &row.exposure).await;
                return Ok(CacheOutcome {
                    exposure: row.exposure,
                    source: CacheSource::Precomputed,
                    served_stale: false,
                });
            }
            Ok(Some(row)) => {
                self.precomputed_misses.fetch_add(1, Ordering::Relaxed);
                stale_fallback = Some(row);
            }
            Ok(None) => {
                self.precomputed_misses.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.precomputed_errors.fetch_add(1, Ordering::Relaxed);
                warn!("precomputed store read failed, falling through: {}", e);
            }
        }

        match self.engine.exposure(patio_id, key.slot, cancel).await {
            Ok(exposure) => {
                self.computed.fetch_add(1, Ordering::Relaxed);
                self.backfill_all(key, &exposure).await;
                Ok(CacheOutcome {
                    exposure,
                    source: CacheSource::Computed,
                    served_stale: false,
                })
            }
            Err(e) => {
                if let Some(row) = stale_fallback {
                    self.served_stale.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "compute failed for patio {}, serving stale precomputed row: {}",
                        patio_id, e
                    );
                    let mut exposure = row.exposure;
                    exposure.confidence = (exposure.confidence
                        * self.settings.stale_confidence_factor)
                        .clamp(0.0, 1.0);
                    return Ok(CacheOutcome {
                        exposure,
                        source: CacheSource::Precomputed,
                        served_stale: true,
                    });
                }
                Err(e)
            }
        }
    }

    /// Proactively populate every layer for a patio set over a time range.
    /// Returns the number of slots now resident. Used ahead of predictable
    /// demand spikes; failures on individual slots are skipped.
    pub async fn warm(
        &self,
        patio_ids: &[PatioId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: i64,
        cancel: &CancelToken,
    ) -> CoreResult<usize> {
        let step = Duration::minutes(interval_minutes.max(self.settings.granularity_minutes));
        let mut warmed = 0;
        for &patio_id in patio_ids {
            let mut cursor = start;
            while cursor <= end {
                if cancel.is_cancelled() {
                    return Err(CoreError::Cancelled("warm aborted".into()));
                }
                match self.get(patio_id, cursor, cancel).await {
                    Ok(_) => warmed += 1,
                    Err(e) => debug!("warm skipped patio {} at {}: {}", patio_id, cursor, e),
                }
                cursor += step;
            }
        }
        Ok(warmed)
    }

    /// Invalidate one patio across all layers: memory and distributed
    /// entries are dropped, precomputed rows are marked stale rather than
    /// deleted so they remain available as degraded fallbacks. Returns the
    /// number of precomputed rows marked.
    pub async fn invalidate(
        &self,
        patio_id: PatioId,
        date: Option<NaiveDate>,
    ) -> CoreResult<usize> {
        self.memory.invalidate_patio(patio_id);
        if let Err(e) = self.distributed.invalidate_patio(patio_id).await {
            self.distributed_errors.fetch_add(1, Ordering::Relaxed);
            warn!("distributed invalidation failed for patio {}: {}", patio_id, e);
        }
        let marked = self.precomputed.mark_stale(patio_id, date).await?;
        Ok(marked)
    }

    pub async fn metrics(&self) -> CacheMetrics {
        let distributed_entries = self.distributed.entry_count().await.unwrap_or(0);
        let precomputed_entries = self.precomputed.row_count().await.unwrap_or(0);
        CacheMetrics {
            memory: self.memory.metrics(),
            distributed: LayerMetrics {
                hits: self.distributed_hits.load(Ordering::Relaxed),
                misses: self.distributed_misses.load(Ordering::Relaxed),
                errors: self.distributed_errors.load(Ordering::Relaxed),
                evictions: 0,
                entries: distributed_entries,
            },
            precomputed: LayerMetrics {
                hits: self.precomputed_hits.load(Ordering::Relaxed),
                misses: self.precomputed_misses.load(Ordering::Relaxed),
                errors: self.precomputed_errors.load(Ordering::Relaxed),
                evictions: 0,
                entries: precomputed_entries,
            },
            computed: self.computed.load(Ordering::Relaxed),
            served_stale: self.served_stale.load(Ordering::Relaxed),
            avg_read_micros: match self.read_count.load(Ordering::Relaxed) {
                0 => 0,
                n => self.read_micros.load(Ordering::Relaxed) / n,
            },
        }
    }

    /// Probe layer availability and derive an overall status. Memory is
    /// always available in-process; the distributed and precomputed layers
    /// are probed live.
    pub async fn health(&self) -> CacheHealth {
        let distributed_available = self.distributed.entry_count().await.is_ok();
        let precomputed_probe = self.precomputed.row_count().await;
        let precomputed_available = precomputed_probe.is_ok();

        let status = match (distributed_available, precomputed_available) {
            (true, true) => CacheHealthStatus::Healthy,
            (false, true) => CacheHealthStatus::Degraded,
            (true, false) => CacheHealthStatus::Unhealthy,
            (false, false) => CacheHealthStatus::Critical,
        };

        CacheHealth {
            status,
            memory_entries: self.memory.len(),
            distributed_available,
            precomputed_available,
            precomputed_rows: precomputed_probe.ok(),
        }
    }

    async fn backfill_distributed(&self, key: CacheKey, exposure: &PatioSunExposure) {
        let ttl = StdDuration::from_secs(self.settings.distributed_ttl_secs);
        if let Err(e) = self.distributed.put(key, exposure.clone(), ttl).await {
            self.distributed_errors.fetch_add(1, Ordering::Relaxed);
            debug!("distributed backfill failed: {}", e);
        }
    }

    async fn backfill_all(&self, key: CacheKey, exposure: &PatioSunExposure) {
        self.memory.insert(key, exposure.clone());
        self.backfill_distributed(key, exposure).await;

        let now = Utc::now();
        let row = PrecomputedSunExposure {
            exposure: exposure.clone(),
            computed_at: now,
            expires_at: now + self.precompute_expiry,
            algorithm_version: ALGORITHM_VERSION,
            is_stale: false,
        };
        if let Err(e) = self.precomputed.upsert(row).await {
            self.precomputed_errors.fetch_add(1, Ordering::Relaxed);
            debug!("precomputed backfill failed: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "layered_tests.rs"]
mod layered_tests;
