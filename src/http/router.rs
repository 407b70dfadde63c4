//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - permissive for development, should be restricted in production
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Solar position
        .route("/solar-position", get(handlers::get_solar_position))
        // Shadows
        .route("/patios/{patio_id}/shadow", get(handlers::get_patio_shadow))
        .route("/patios/shadow/batch", post(handlers::get_batch_patio_shadow))
        .route(
            "/patios/{patio_id}/shadow/timeline",
            get(handlers::get_patio_shadow_timeline),
        )
        // Exposure
        .route("/patios/{patio_id}/exposure", get(handlers::get_patio_exposure))
        .route("/patios/exposure/batch", post(handlers::get_batch_patio_exposure))
        // Timeline and comparison
        .route("/patios/{patio_id}/timeline", get(handlers::get_patio_timeline))
        .route("/patios/{patio_id}/sun-windows", get(handlers::get_sun_windows))
        .route("/patios/compare", post(handlers::compare_patios))
        // Precomputation ops
        .route("/precompute/{date}", post(handlers::schedule_precomputation))
        .route("/precompute/{date}", get(handlers::get_precomputation_status))
        .route(
            "/precompute/{date}/reschedule",
            post(handlers::reschedule_precomputation),
        )
        .route("/precompute/{date}/execute", post(handlers::execute_precomputation))
        .route("/patios/{patio_id}/invalidate", post(handlers::invalidate_patio))
        .route("/buildings/{building_id}/invalidate", post(handlers::invalidate_building))
        .route(
            "/buildings/{building_id}/height",
            put(handlers::override_building_height),
        )
        // Cache ops
        .route("/cache/health", get(handlers::get_cache_health))
        .route("/cache/metrics", get(handlers::get_cache_metrics))
        .route("/cache/warm", post(handlers::warm_cache));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
