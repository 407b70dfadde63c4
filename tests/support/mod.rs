//! Shared fixtures for integration tests: a fully wired engine stack over
//! the in-memory repository, plus geometry builders sized in meters.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use geo::{LineString, Point, Polygon};

use sunpatio_rust::api::{Building, BuildingId, HeightSource, Patio, PatioId, VenueId};
use sunpatio_rust::cache::{LayeredCache, LocalDistributedCache};
use sunpatio_rust::config::CoreConfig;
use sunpatio_rust::db::repositories::{LocalRepository, StaticWeatherProvider};
use sunpatio_rust::geo_util;
use sunpatio_rust::scheduler::PrecomputationScheduler;
use sunpatio_rust::services::{ExposureEngine, TimelineService};

pub const GOTHENBURG_LAT: f64 = 57.7089;
pub const GOTHENBURG_LON: f64 = 11.9746;

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn city_center() -> Point<f64> {
    Point::new(GOTHENBURG_LON, GOTHENBURG_LAT)
}

/// Axis-aligned square footprint centered on a point, sized in meters.
pub fn square(center: Point<f64>, half_m: f64) -> Polygon<f64> {
    let corners: Vec<(f64, f64)> = [
        (-half_m, -half_m),
        (half_m, -half_m),
        (half_m, half_m),
        (-half_m, half_m),
        (-half_m, -half_m),
    ]
    .iter()
    .map(|&(e, n)| {
        let p = geo_util::offset_point(center, e, n);
        (p.x(), p.y())
    })
    .collect();
    Polygon::new(LineString::from(corners), vec![])
}

pub fn open_patio(id: i64, center: Point<f64>) -> Patio {
    Patio {
        id: PatioId::new(id),
        venue_id: VenueId::new(id),
        footprint: square(center, 5.0),
        height_m: 0.0,
        polygon_quality: 0.9,
    }
}

pub fn building(id: i64, center: Point<f64>, height_m: f64) -> Building {
    Building {
        id: BuildingId::new(id),
        footprint: square(center, 10.0),
        height_m,
        height_source: HeightSource::Lidar,
        data_quality: 0.9,
    }
}

/// The full production wiring over the in-memory backend.
pub struct TestStack {
    pub repo: Arc<LocalRepository>,
    pub weather: Arc<StaticWeatherProvider>,
    pub distributed: Arc<LocalDistributedCache>,
    pub engine: Arc<ExposureEngine>,
    pub cache: Arc<LayeredCache>,
    pub scheduler: Arc<PrecomputationScheduler>,
    pub timeline: Arc<TimelineService>,
}

pub fn stack() -> TestStack {
    stack_with(|_| {})
}

pub fn stack_with(tweak: impl FnOnce(&mut CoreConfig)) -> TestStack {
    let repo = Arc::new(LocalRepository::new());
    let weather = Arc::new(StaticWeatherProvider::new());
    let distributed = Arc::new(LocalDistributedCache::new());

    let mut config = CoreConfig::default();
    config.location.latitude = GOTHENBURG_LAT;
    config.location.longitude = GOTHENBURG_LON;
    config.scheduler.slot_interval_minutes = 240;
    config.scheduler.retry_delay_ms = 1;
    tweak(&mut config);
    let timeline_settings = config.timeline.clone();

    let engine = Arc::new(ExposureEngine::new(
        repo.clone(),
        repo.clone(),
        weather.clone(),
        config,
    ));
    let cache = Arc::new(LayeredCache::new(
        distributed.clone(),
        repo.clone(),
        engine.clone(),
    ));
    let scheduler = Arc::new(PrecomputationScheduler::new(
        engine.clone(),
        repo.clone(),
        repo.clone(),
        repo.clone(),
        cache.clone(),
    ));
    let timeline = Arc::new(TimelineService::new(cache.clone(), timeline_settings));

    TestStack {
        repo,
        weather,
        distributed,
        engine,
        cache,
        scheduler,
        timeline,
    }
}
