//! Sun exposure orchestrator.
//!
//! Composes the solar calculator, shadow engine and confidence scorer into
//! the canonical per-patio exposure record, for single lookups and for
//! batches sharing one timestamp. Batch semantics are partial-failure:
//! a geometry failure on one patio is captured as a marker while the rest
//! of the batch still returns.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::api::{
    BatchExposureResult, BatchItemFailure, CancelToken, ConfidenceFactors, CoreError, CoreResult,
    ExposureState, Patio, PatioId, PatioSunExposure, SolarPosition,
};
use crate::config::CoreConfig;
use crate::db::repository::{BuildingRepository, PatioRepository, WeatherProvider};
use crate::geo_util;
use crate::services::{confidence, shadow, solar};

/// Orchestrates exposure computation against the collaborator repositories.
pub struct ExposureEngine {
    buildings: Arc<dyn BuildingRepository>,
    patios: Arc<dyn PatioRepository>,
    weather: Arc<dyn WeatherProvider>,
    config: CoreConfig,
}

impl ExposureEngine {
    pub fn new(
        buildings: Arc<dyn BuildingRepository>,
        patios: Arc<dyn PatioRepository>,
        weather: Arc<dyn WeatherProvider>,
        config: CoreConfig,
    ) -> Self {
        Self {
            buildings,
            patios,
            weather,
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Solar position shared by every patio computed at this timestamp.
    ///
    /// Computed at the configured city reference point: across a city the
    /// position varies by far less than the model error, and sharing it is
    /// what makes batch computation cheap and batch/single results equal.
    pub fn shared_solar_position(&self, timestamp: DateTime<Utc>) -> CoreResult<SolarPosition> {
        solar::solar_position(
            timestamp,
            self.config.location.latitude,
            self.config.location.longitude,
        )
    }

    /// Compute the exposure record for a single patio. The token is
    /// checked before any repository or geometry work starts.
    pub async fn exposure(
        &self,
        patio_id: PatioId,
        timestamp: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> CoreResult<PatioSunExposure> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled("exposure lookup aborted".into()));
        }
        let solar_position = self.shared_solar_position(timestamp)?;
        let patio = self
            .patios
            .patio_by_id(patio_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("patio {}", patio_id)))?;

        self.exposure_for_patio(&patio, &solar_position).await
    }

    /// Compute exposure for a batch of patios at one timestamp.
    ///
    /// Single-item failures are captured per item; output ordering is not
    /// guaranteed to match the input. Rejects batches over the configured
    /// cap with `InvalidArgument`.
    pub async fn batch_exposure(
        &self,
        patio_ids: &[PatioId],
        timestamp: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> CoreResult<BatchExposureResult> {
        if patio_ids.len() > self.config.exposure.batch_cap {
            return Err(CoreError::InvalidArgument(format!(
                "batch of {} patios exceeds cap of {}",
                patio_ids.len(),
                self.config.exposure.batch_cap
            )));
        }

        let solar_position = self.shared_solar_position(timestamp)?;

        let tasks = patio_ids.iter().map(|&patio_id| {
            let solar_position = solar_position;
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return (patio_id, Err(CoreError::Cancelled("batch aborted".into())));
                }
                let result = match self.patios.patio_by_id(patio_id).await {
                    Ok(Some(patio)) => self.exposure_for_patio(&patio, &solar_position).await,
                    Ok(None) => Err(CoreError::NotFound(format!("patio {}", patio_id))),
                    Err(e) => Err(e.into()),
                };
                (patio_id, result)
            }
        });

        let mut batch = BatchExposureResult::default();
        for (patio_id, result) in futures::future::join_all(tasks).await {
            match result {
                Ok(exposure) => {
                    batch.results.insert(patio_id, exposure);
                }
                Err(e) => batch.failures.push(BatchItemFailure {
                    patio_id,
                    reason: format!("{}: {}", e.kind(), e),
                }),
            }
        }
        Ok(batch)
    }

    /// Full pipeline for one patio under an already-computed solar position.
    async fn exposure_for_patio(
        &self,
        patio: &Patio,
        solar_position: &SolarPosition,
    ) -> CoreResult<PatioSunExposure> {
        let started = Instant::now();

        // Sun below the horizon short-circuits the geometry engine
        // entirely; the outcome is astronomically certain.
        if !solar::is_sun_visible(solar_position) {
            return Ok(PatioSunExposure {
                patio_id: patio.id,
                timestamp: solar_position.timestamp,
                sunlit_pct: 0.0,
                shaded_pct: 100.0,
                state: ExposureState::NoSun,
                confidence: 1.0,
                solar: *solar_position,
                factors: ConfidenceFactors {
                    building_data_quality: 1.0,
                    geometry_precision: 1.0,
                    solar_accuracy: 1.0,
                    shadow_accuracy: 1.0,
                    weather_certainty: 1.0,
                    weather_available: false,
                    overall: 1.0,
                },
                computation_ms: started.elapsed().as_millis() as u64,
            });
        }

        let center = geo_util::polygon_centroid(&patio.footprint);
        let candidates = self
            .buildings
            .buildings_near(center, self.config.shadow.search_radius_m)
            .await?;

        let building_quality = if candidates.is_empty() {
            // Nothing nearby to be wrong about.
            1.0
        } else {
            candidates.iter().map(|b| b.data_quality).sum::<f64>() / candidates.len() as f64
        };

        let shadows: Vec<_> = candidates
            .iter()
            .filter_map(|b| shadow::cast_shadow(b, solar_position, &self.config.shadow))
            .collect();

        let (sunlit_pct, shaded_pct) = shadow::patio_shadow_coverage(&patio.footprint, &shadows)?;

        let cloud_cover = self.latest_cloud_cover(solar_position.timestamp).await;
        let factors = confidence::score(
            confidence::ConfidenceInput {
                building_data_quality: building_quality,
                geometry_precision: patio.polygon_quality,
                solar_accuracy: confidence::SOLAR_ACCURACY,
                shadow_accuracy: confidence::SHADOW_ACCURACY,
                cloud_cover,
            },
            &self.config.confidence,
        );

        Ok(PatioSunExposure {
            patio_id: patio.id,
            timestamp: solar_position.timestamp,
            sunlit_pct,
            shaded_pct,
            state: confidence::classify_state(solar_position.elevation_deg, sunlit_pct),
            confidence: factors.overall,
            solar: *solar_position,
            factors,
            computation_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Weather is best-effort: a provider outage degrades confidence via
    /// the missing-weather penalty, it never fails the computation.
    async fn latest_cloud_cover(&self, timestamp: DateTime<Utc>) -> Option<f64> {
        match self.weather.latest_weather(timestamp).await {
            Ok(Some(observation)) => Some(observation.cloud_cover),
            Ok(None) => None,
            Err(e) => {
                warn!("weather provider degraded: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "exposure_tests.rs"]
mod exposure_tests;
