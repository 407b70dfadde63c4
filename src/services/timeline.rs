//! Timeline service.
//!
//! Derives finite, ordered exposure timelines from the cache chain, plus
//! the summaries built on top of them: "sun windows" (contiguous favorable
//! ranges) and cross-patio comparison. All reads go through the layered
//! cache; the timeline never computes geometry directly.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{CancelToken, CoreError, CoreResult, ExposureState, PatioId, PatioSunExposure};
use crate::cache::LayeredCache;
use crate::config::TimelineSettings;

/// One point on an exposure timeline. `served_stale` is carried through
/// from the cache so clients can see degraded segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub exposure: PatioSunExposure,
    pub served_stale: bool,
}

/// A maximal contiguous range where the exposure state is favorable
/// (Sunny or Partial) above the quality threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SunWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub avg_sunlit_pct: f64,
    pub avg_confidence: f64,
    /// Ranking key: average of sunlit fraction times confidence.
    pub quality: f64,
}

/// Per-patio summary used by compare/find_best. `score` is the
/// confidence-weighted average sunlit percentage over the range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatioRanking {
    pub patio_id: PatioId,
    pub score: f64,
    pub min_confidence: f64,
    pub points: usize,
}

pub struct TimelineService {
    cache: Arc<LayeredCache>,
    settings: TimelineSettings,
}

impl TimelineService {
    pub fn new(cache: Arc<LayeredCache>, settings: TimelineSettings) -> Self {
        Self { cache, settings }
    }

    /// Ordered exposure points for one patio over a closed time range.
    ///
    /// The range and interval are validated up front so the point count is
    /// always finite and bounded by the configured maximum. The token is
    /// checked on every point, so a long range can be abandoned mid-walk.
    pub async fn timeline(
        &self,
        patio_id: PatioId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: i64,
        cancel: &CancelToken,
    ) -> CoreResult<Vec<TimelinePoint>> {
        let interval = self.validated_interval(start, end, interval_minutes)?;

        let mut points = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled("timeline aborted".into()));
            }
            let outcome = self.cache.get(patio_id, cursor, cancel).await?;
            points.push(TimelinePoint {
                exposure: outcome.exposure,
                served_stale: outcome.served_stale,
            });
            cursor += interval;
        }
        Ok(points)
    }

    /// Favorable windows over a range, best first.
    pub async fn sun_windows(
        &self,
        patio_id: PatioId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: i64,
        max_windows: usize,
        cancel: &CancelToken,
    ) -> CoreResult<Vec<SunWindow>> {
        let points = self
            .timeline(patio_id, start, end, interval_minutes, cancel)
            .await?;

        let mut windows = Vec::new();
        let mut run: Vec<&TimelinePoint> = Vec::new();
        for point in &points {
            if self.is_favorable(point) {
                run.push(point);
            } else if !run.is_empty() {
                windows.push(Self::window_from_run(&run));
                run.clear();
            }
        }
        if !run.is_empty() {
            windows.push(Self::window_from_run(&run));
        }

        windows.sort_by(|a, b| b.quality.total_cmp(&a.quality));
        windows.truncate(max_windows.min(self.settings.max_windows));
        Ok(windows)
    }

    /// Rank several patios over one range, best first. The ranking key is
    /// the confidence-weighted average sunlit percentage; ties go to the
    /// patio with the higher minimum confidence.
    pub async fn compare(
        &self,
        patio_ids: &[PatioId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: i64,
        cancel: &CancelToken,
    ) -> CoreResult<Vec<PatioRanking>> {
        let mut rankings = Vec::with_capacity(patio_ids.len());
        for &patio_id in patio_ids {
            let points = self
                .timeline(patio_id, start, end, interval_minutes, cancel)
                .await?;
            rankings.push(Self::ranking_from_points(patio_id, &points));
        }

        rankings.sort_by(|a, b| {
            if (a.score - b.score).abs() < 1e-9 {
                b.min_confidence.total_cmp(&a.min_confidence)
            } else {
                b.score.total_cmp(&a.score)
            }
        });
        Ok(rankings)
    }

    /// The single best patio over a range, if any were given.
    pub async fn find_best(
        &self,
        patio_ids: &[PatioId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: i64,
        cancel: &CancelToken,
    ) -> CoreResult<Option<PatioRanking>> {
        Ok(self
            .compare(patio_ids, start, end, interval_minutes, cancel)
            .await?
            .into_iter()
            .next())
    }

    fn validated_interval(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: i64,
    ) -> CoreResult<Duration> {
        if end <= start {
            return Err(CoreError::InvalidArgument(format!(
                "time range end {} is not after start {}",
                end, start
            )));
        }
        if interval_minutes < self.settings.min_interval_minutes {
            return Err(CoreError::InvalidArgument(format!(
                "interval {} min is below the minimum of {} min",
                interval_minutes, self.settings.min_interval_minutes
            )));
        }

        let span_minutes = (end - start).num_minutes();
        let point_count = span_minutes / interval_minutes + 1;
        if point_count > self.settings.max_points as i64 {
            return Err(CoreError::InvalidArgument(format!(
                "range would produce {} points, above the cap of {}",
                point_count, self.settings.max_points
            )));
        }
        Ok(Duration::minutes(interval_minutes))
    }

    fn is_favorable(&self, point: &TimelinePoint) -> bool {
        let state_ok = matches!(
            point.exposure.state,
            ExposureState::Sunny | ExposureState::Partial
        );
        let quality = point.exposure.sunlit_pct / 100.0 * point.exposure.confidence;
        state_ok && quality >= self.settings.window_quality_threshold
    }

    fn window_from_run(run: &[&TimelinePoint]) -> SunWindow {
        let n = run.len() as f64;
        let avg_sunlit_pct = run.iter().map(|p| p.exposure.sunlit_pct).sum::<f64>() / n;
        let avg_confidence = run.iter().map(|p| p.exposure.confidence).sum::<f64>() / n;
        let quality = run
            .iter()
            .map(|p| p.exposure.sunlit_pct / 100.0 * p.exposure.confidence)
            .sum::<f64>()
            / n;
        SunWindow {
            start: run[0].exposure.timestamp,
            end: run[run.len() - 1].exposure.timestamp,
            avg_sunlit_pct,
            avg_confidence,
            quality,
        }
    }

    fn ranking_from_points(patio_id: PatioId, points: &[TimelinePoint]) -> PatioRanking {
        let weight_sum: f64 = points.iter().map(|p| p.exposure.confidence).sum();
        let score = if weight_sum > 0.0 {
            points
                .iter()
                .map(|p| p.exposure.sunlit_pct * p.exposure.confidence)
                .sum::<f64>()
                / weight_sum
        } else {
            0.0
        };
        let min_confidence = points
            .iter()
            .map(|p| p.exposure.confidence)
            .fold(f64::INFINITY, f64::min);
        PatioRanking {
            patio_id,
            score,
            min_confidence: if min_confidence.is_finite() {
                min_confidence
            } else {
                0.0
            },
            points: points.len(),
        }
    }
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod timeline_tests;
