//! HTTP handlers for the REST API.
//!
//! Each handler parses the request, delegates to the service layer and
//! maps core errors onto HTTP status codes via `AppError`.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::error;

use super::dto::{
    BatchExposureRequest, BatchExposureResponse, BatchItemFailure, BatchShadowRequest,
    BatchShadowResponse, CacheHealth, CacheMetrics, CompareRequest, CompareResponse,
    ExecuteResponse, ExposureResponse, HealthResponse, HeightOverrideRequest,
    HeightOverrideResponse, InvalidateQuery, InvalidateResponse, PatioShadowResponse,
    PrecomputationSchedule, RangeQuery, ShadowDto, ShadowTimelinePoint, SolarPosition,
    SolarPositionQuery, SunWindow, SunWindowsQuery, TimelinePoint, TimestampQuery, WarmRequest,
    WarmResponse, polygon_coords,
};
use super::error::AppError;
use super::state::AppState;
use crate::api::{BuildingId, CancelToken, CoreError, PatioId};
use crate::cache::CacheHealthStatus;
use crate::db::repository::{BuildingRepository, PatioRepository};
use crate::geo_util;
use crate::services::{confidence, shadow, solar};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

// =============================================================================
// Health
// =============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let cache = state.cache.health().await;
    let status = match cache.status {
        CacheHealthStatus::Healthy => "ok",
        CacheHealthStatus::Degraded => "degraded",
        CacheHealthStatus::Unhealthy | CacheHealthStatus::Critical => "unhealthy",
    };
    Ok(Json(HealthResponse {
        status: status.to_string(),
        version: "v1".to_string(),
        cache,
    }))
}

// =============================================================================
// Solar position
// =============================================================================

/// GET /v1/solar-position
pub async fn get_solar_position(
    Query(query): Query<SolarPositionQuery>,
) -> HandlerResult<SolarPosition> {
    let position = solar::solar_position(query.timestamp, query.latitude, query.longitude)?;
    Ok(Json(position))
}

// =============================================================================
// Shadows
// =============================================================================

/// GET /v1/patios/{id}/shadow
pub async fn get_patio_shadow(
    State(state): State<AppState>,
    Path(patio_id): Path<i64>,
    Query(query): Query<TimestampQuery>,
) -> HandlerResult<PatioShadowResponse> {
    let response = shadow_picture(&state, PatioId::new(patio_id), query.timestamp).await?;
    Ok(Json(response))
}

/// POST /v1/patios/shadow/batch
pub async fn get_batch_patio_shadow(
    State(state): State<AppState>,
    Json(request): Json<BatchShadowRequest>,
) -> HandlerResult<BatchShadowResponse> {
    let cap = state.engine.config().exposure.batch_cap;
    if request.patio_ids.len() > cap {
        return Err(AppError::BadRequest(format!(
            "batch of {} patios exceeds cap of {}",
            request.patio_ids.len(),
            cap
        )));
    }

    let mut results = HashMap::new();
    let mut failures = Vec::new();
    for &raw_id in &request.patio_ids {
        let patio_id = PatioId::new(raw_id);
        match shadow_picture(&state, patio_id, request.timestamp).await {
            Ok(response) => {
                results.insert(raw_id, response);
            }
            Err(e) => failures.push(BatchItemFailure {
                patio_id,
                reason: e.to_string(),
            }),
        }
    }
    Ok(Json(BatchShadowResponse { results, failures }))
}

/// GET /v1/patios/{id}/shadow/timeline
pub async fn get_patio_shadow_timeline(
    State(state): State<AppState>,
    Path(patio_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> HandlerResult<Vec<ShadowTimelinePoint>> {
    validate_range(&state, query.start, query.end, query.interval_minutes)?;

    let patio_id = PatioId::new(patio_id);
    let mut points = Vec::new();
    let mut cursor = query.start;
    let step = chrono::Duration::minutes(query.interval_minutes);
    while cursor <= query.end {
        let picture = shadow_picture(&state, patio_id, cursor).await?;
        points.push(ShadowTimelinePoint {
            timestamp: cursor,
            sunlit_pct: picture.sunlit_pct,
            shaded_pct: picture.shaded_pct,
            solar_elevation_deg: picture.solar.elevation_deg,
        });
        cursor += step;
    }
    Ok(Json(points))
}

async fn shadow_picture(
    state: &AppState,
    patio_id: PatioId,
    timestamp: DateTime<Utc>,
) -> Result<PatioShadowResponse, CoreError> {
    let patio = state
        .patios
        .patio_by_id(patio_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("patio {}", patio_id)))?;
    let position = state.engine.shared_solar_position(timestamp)?;

    // Sun below the horizon: no shadow geometry, everything is dark.
    if !solar::is_sun_visible(&position) {
        return Ok(PatioShadowResponse {
            patio_id: patio_id.value(),
            timestamp,
            solar: position,
            sunlit_pct: 0.0,
            shaded_pct: 100.0,
            shadows: Vec::new(),
        });
    }

    let settings = &state.engine.config().shadow;
    let center = geo_util::polygon_centroid(&patio.footprint);
    let shadows = shadow::all_shadows(
        &position,
        center,
        settings.search_radius_m,
        state.buildings.as_ref(),
        settings,
    )
    .await?;
    let (sunlit_pct, shaded_pct) = shadow::patio_shadow_coverage(&patio.footprint, &shadows)?;

    Ok(PatioShadowResponse {
        patio_id: patio_id.value(),
        timestamp,
        solar: position,
        sunlit_pct,
        shaded_pct,
        shadows: shadows
            .iter()
            .map(|s| ShadowDto {
                building_id: s.building_id.value(),
                polygon: polygon_coords(&s.polygon),
                solar_elevation_deg: s.solar_elevation_deg,
            })
            .collect(),
    })
}

// =============================================================================
// Exposure
// =============================================================================

/// GET /v1/patios/{id}/exposure
///
/// Served through the cache chain; the response carries provenance so
/// clients can hedge stale or low-confidence results.
pub async fn get_patio_exposure(
    State(state): State<AppState>,
    Path(patio_id): Path<i64>,
    Query(query): Query<TimestampQuery>,
) -> HandlerResult<ExposureResponse> {
    let cancel = CancelToken::new();
    let outcome = state
        .cache
        .get(PatioId::new(patio_id), query.timestamp, &cancel)
        .await?;
    let reliable = confidence::is_reliable(
        outcome.exposure.confidence,
        &state.engine.config().confidence,
    );
    Ok(Json(ExposureResponse {
        exposure: outcome.exposure,
        source: outcome.source,
        served_stale: outcome.served_stale,
        reliable,
    }))
}

/// POST /v1/patios/exposure/batch
pub async fn get_batch_patio_exposure(
    State(state): State<AppState>,
    Json(request): Json<BatchExposureRequest>,
) -> HandlerResult<BatchExposureResponse> {
    let ids: Vec<PatioId> = request.patio_ids.iter().map(|&id| PatioId::new(id)).collect();
    let cancel = CancelToken::new();
    let batch = state
        .engine
        .batch_exposure(&ids, request.timestamp, &cancel)
        .await?;

    Ok(Json(BatchExposureResponse {
        results: batch
            .results
            .into_iter()
            .map(|(id, exposure)| (id.value(), exposure))
            .collect(),
        failures: batch.failures,
    }))
}

// =============================================================================
// Timeline
// =============================================================================

/// GET /v1/patios/{id}/timeline
pub async fn get_patio_timeline(
    State(state): State<AppState>,
    Path(patio_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> HandlerResult<Vec<TimelinePoint>> {
    let cancel = CancelToken::new();
    let points = state
        .timeline
        .timeline(
            PatioId::new(patio_id),
            query.start,
            query.end,
            query.interval_minutes,
            &cancel,
        )
        .await?;
    Ok(Json(points))
}

/// GET /v1/patios/{id}/sun-windows
pub async fn get_sun_windows(
    State(state): State<AppState>,
    Path(patio_id): Path<i64>,
    Query(query): Query<SunWindowsQuery>,
) -> HandlerResult<Vec<SunWindow>> {
    let max_windows = query
        .max_windows
        .unwrap_or(state.engine.config().timeline.max_windows);
    let cancel = CancelToken::new();
    let windows = state
        .timeline
        .sun_windows(
            PatioId::new(patio_id),
            query.start,
            query.end,
            query.interval_minutes,
            max_windows,
            &cancel,
        )
        .await?;
    Ok(Json(windows))
}

/// POST /v1/patios/compare
pub async fn compare_patios(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> HandlerResult<CompareResponse> {
    let ids: Vec<PatioId> = request.patio_ids.iter().map(|&id| PatioId::new(id)).collect();
    let cancel = CancelToken::new();
    let rankings = state
        .timeline
        .compare(
            &ids,
            request.start,
            request.end,
            request.interval_minutes,
            &cancel,
        )
        .await?;
    let best = rankings.first().cloned();
    Ok(Json(CompareResponse { rankings, best }))
}

// =============================================================================
// Precomputation / ops
// =============================================================================

/// POST /v1/precompute/{date}
pub async fn schedule_precomputation(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> Result<(StatusCode, Json<PrecomputationSchedule>), AppError> {
    let record = state.scheduler.schedule(date);
    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// POST /v1/precompute/{date}/reschedule
///
/// Resets a finished date back to Pending so it can be recomputed. A
/// plain schedule call never discards a finished record.
pub async fn reschedule_precomputation(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> Result<(StatusCode, Json<PrecomputationSchedule>), AppError> {
    let record = state.scheduler.reschedule(date)?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// POST /v1/precompute/{date}/execute
///
/// Kicks off the run in the background; progress is visible via the
/// status endpoint.
pub async fn execute_precomputation(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> Result<(StatusCode, Json<ExecuteResponse>), AppError> {
    let record = state.scheduler.schedule(date);
    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        if let Err(e) = scheduler.execute(date, &CancelToken::new()).await {
            error!("precomputation for {} did not run: {}", date, e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ExecuteResponse {
            schedule: record,
            message: format!("Precomputation started. Track it at /v1/precompute/{}", date),
        }),
    ))
}

/// GET /v1/precompute/{date}
pub async fn get_precomputation_status(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> HandlerResult<PrecomputationSchedule> {
    state
        .scheduler
        .status(date)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no schedule for {}", date)))
}

/// POST /v1/patios/{id}/invalidate
pub async fn invalidate_patio(
    State(state): State<AppState>,
    Path(patio_id): Path<i64>,
    Query(query): Query<InvalidateQuery>,
) -> HandlerResult<InvalidateResponse> {
    let rows_marked = state
        .scheduler
        .invalidate(PatioId::new(patio_id), query.date)
        .await?;
    Ok(Json(InvalidateResponse { rows_marked }))
}

/// POST /v1/buildings/{id}/invalidate
pub async fn invalidate_building(
    State(state): State<AppState>,
    Path(building_id): Path<i64>,
) -> HandlerResult<InvalidateResponse> {
    let rows_marked = state
        .scheduler
        .invalidate_for_building_change(BuildingId::new(building_id))
        .await?;
    Ok(Json(InvalidateResponse { rows_marked }))
}

/// PUT /v1/buildings/{id}/height
///
/// Height override followed by invalidation of every patio the building
/// could shade; the two steps belong together.
pub async fn override_building_height(
    State(state): State<AppState>,
    Path(building_id): Path<i64>,
    Json(request): Json<HeightOverrideRequest>,
) -> HandlerResult<HeightOverrideResponse> {
    if !request.height_m.is_finite() || request.height_m < 0.0 {
        return Err(AppError::BadRequest(format!(
            "height {} must be a non-negative number",
            request.height_m
        )));
    }

    let id = BuildingId::new(building_id);
    state
        .buildings
        .override_building_height(id, request.height_m, request.source)
        .await?;
    let rows_marked = state.scheduler.invalidate_for_building_change(id).await?;

    Ok(Json(HeightOverrideResponse {
        building_id,
        rows_marked,
    }))
}

// =============================================================================
// Cache ops
// =============================================================================

/// GET /v1/cache/health
pub async fn get_cache_health(State(state): State<AppState>) -> HandlerResult<CacheHealth> {
    Ok(Json(state.cache.health().await))
}

/// GET /v1/cache/metrics
pub async fn get_cache_metrics(State(state): State<AppState>) -> HandlerResult<CacheMetrics> {
    Ok(Json(state.cache.metrics().await))
}

/// POST /v1/cache/warm
pub async fn warm_cache(
    State(state): State<AppState>,
    Json(request): Json<WarmRequest>,
) -> HandlerResult<WarmResponse> {
    validate_range(&state, request.start, request.end, request.interval_minutes)?;
    let ids: Vec<PatioId> = request.patio_ids.iter().map(|&id| PatioId::new(id)).collect();
    let cancel = CancelToken::new();
    let slots_warmed = state
        .cache
        .warm(
            &ids,
            request.start,
            request.end,
            request.interval_minutes,
            &cancel,
        )
        .await?;
    Ok(Json(WarmResponse { slots_warmed }))
}

fn validate_range(
    state: &AppState,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval_minutes: i64,
) -> Result<(), AppError> {
    if end <= start {
        return Err(AppError::BadRequest(format!(
            "time range end {} is not after start {}",
            end, start
        )));
    }
    if interval_minutes < 1 {
        return Err(AppError::BadRequest(format!(
            "interval {} min must be positive",
            interval_minutes
        )));
    }
    let points = (end - start).num_minutes() / interval_minutes + 1;
    let cap = state.engine.config().timeline.max_points as i64;
    if points > cap {
        return Err(AppError::BadRequest(format!(
            "range would produce {} points, above the cap of {}",
            points, cap
        )));
    }
    Ok(())
}
