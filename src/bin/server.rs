//! Sunpatio HTTP Server Binary
//!
//! Main entry point for the sun exposure REST API server. It loads the
//! engine configuration, wires the repository, cache chain, scheduler and
//! timeline service together, and starts serving requests with the
//! background precomputation loop running alongside.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sunpatio-server --features "local-repo,http-server"
//! ```
//!
//! # Environment Variables
//!
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8080)
//! - `SUNPATIO_CONFIG`: Path to a TOML config file (optional)
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sunpatio_rust::api::CancelToken;
use sunpatio_rust::cache::{LayeredCache, LocalDistributedCache};
use sunpatio_rust::config::CoreConfig;
use sunpatio_rust::db::repositories::{LocalRepository, StaticWeatherProvider};
use sunpatio_rust::http::{create_router, AppState};
use sunpatio_rust::scheduler::PrecomputationScheduler;
use sunpatio_rust::services::{ExposureEngine, TimelineService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .init();

    info!("Starting Sunpatio HTTP Server");

    let config = match env::var("SUNPATIO_CONFIG") {
        Ok(path) => CoreConfig::from_file(&path)?,
        Err(_) => CoreConfig::default(),
    };
    info!(
        "Configured for ({}, {})",
        config.location.latitude, config.location.longitude
    );

    let repository = Arc::new(LocalRepository::new());
    let weather = Arc::new(StaticWeatherProvider::new());
    let distributed = Arc::new(LocalDistributedCache::new());
    let timeline_settings = config.timeline.clone();

    let engine = Arc::new(ExposureEngine::new(
        repository.clone(),
        repository.clone(),
        weather,
        config,
    ));
    let cache = Arc::new(LayeredCache::new(
        distributed,
        repository.clone(),
        engine.clone(),
    ));
    let scheduler = Arc::new(PrecomputationScheduler::new(
        engine.clone(),
        repository.clone(),
        repository.clone(),
        repository.clone(),
        cache.clone(),
    ));
    let timeline = Arc::new(TimelineService::new(cache.clone(), timeline_settings));

    // Background precomputation upkeep; cancelled on shutdown.
    let upkeep_cancel = CancelToken::new();
    let upkeep = {
        let scheduler = scheduler.clone();
        let cancel = upkeep_cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let state = AppState::new(
        engine,
        cache,
        scheduler,
        timeline,
        repository.clone(),
        repository,
    );
    let app = create_router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    upkeep_cancel.cancel();
    upkeep.abort();

    Ok(())
}
