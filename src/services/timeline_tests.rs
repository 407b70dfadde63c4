use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use geo::{LineString, Point, Polygon};

use crate::api::{
    Building, BuildingId, CancelToken, CoreError, ExposureState, HeightSource, Patio, PatioId,
    VenueId,
};
use crate::cache::{LayeredCache, LocalDistributedCache};
use crate::config::CoreConfig;
use crate::db::repositories::{LocalRepository, StaticWeatherProvider};
use crate::geo_util;
use crate::services::exposure::ExposureEngine;
use crate::services::timeline::TimelineService;

const GOTHENBURG_LAT: f64 = 57.7089;
const GOTHENBURG_LON: f64 = 11.9746;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn square(center: Point<f64>, half_m: f64) -> Polygon<f64> {
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

struct Fixture {
    service: TimelineService,
    repo: Arc<LocalRepository>,
}

fn fixture() -> Fixture {
    let repo = Arc::new(LocalRepository::new());
    let weather = Arc::new(StaticWeatherProvider::new());
    let distributed = Arc::new(LocalDistributedCache::new());

    let mut config = CoreConfig::default();
    config.location.latitude = GOTHENBURG_LAT;
    config.location.longitude = GOTHENBURG_LON;
    let timeline_settings = config.timeline.clone();

    let engine = Arc::new(ExposureEngine::new(
        repo.clone(),
        repo.clone(),
        weather,
        config,
    ));
    let cache = Arc::new(LayeredCache::new(distributed, repo.clone(), engine));
    Fixture {
        service: TimelineService::new(cache, timeline_settings),
        repo,
    }
}

fn city_center() -> Point<f64> {
    Point::new(GOTHENBURG_LON, GOTHENBURG_LAT)
}

fn open_patio(id: i64, center: Point<f64>) -> Patio {
    Patio {
        id: PatioId::new(id),
        venue_id: VenueId::new(id),
        footprint: square(center, 5.0),
        height_m: 0.0,
        polygon_quality: 0.9,
    }
}

#[tokio::test]
async fn test_timeline_is_ordered_and_finite() {
    let fx = fixture();
    fx.repo.insert_patio(open_patio(1, city_center()));

    let points = fx
        .service
        .timeline(
            PatioId::new(1),
            utc(2024, 6, 21, 10, 0),
            utc(2024, 6, 21, 12, 0),
            30,
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(points.len(), 5);
    for pair in points.windows(2) {
        assert!(pair[0].exposure.timestamp < pair[1].exposure.timestamp);
    }
    assert!(points
        .iter()
        .all(|p| p.exposure.state == ExposureState::Sunny));
}

#[tokio::test]
async fn test_timeline_validation() {
    let fx = fixture();
    fx.repo.insert_patio(open_patio(1, city_center()));
    let start = utc(2024, 6, 21, 10, 0);

    let inverted = fx
        .service
        .timeline(PatioId::new(1), start, start, 30, &CancelToken::new())
        .await;
    assert!(matches!(inverted, Err(CoreError::InvalidArgument(_))));

    let too_fine = fx
        .service
        .timeline(
            PatioId::new(1),
            start,
            utc(2024, 6, 21, 12, 0),
            1,
            &CancelToken::new(),
        )
        .await;
    assert!(matches!(too_fine, Err(CoreError::InvalidArgument(_))));

    // 10 days at 5-minute resolution blows the point cap.
    let too_many = fx
        .service
        .timeline(
            PatioId::new(1),
            start,
            utc(2024, 7, 1, 10, 0),
            5,
            &CancelToken::new(),
        )
        .await;
    assert!(matches!(too_many, Err(CoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_sun_window_ends_at_sunset() {
    let fx = fixture();
    fx.repo.insert_patio(open_patio(1, city_center()));

    // Solstice sunset in Gothenburg is around 20:17 UTC; the evening range
    // crosses it, so favorable points stop after 20:00.
    let windows = fx
        .service
        .sun_windows(
            PatioId::new(1),
            utc(2024, 6, 21, 18, 0),
            utc(2024, 6, 21, 23, 0),
            30,
            5,
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].start, utc(2024, 6, 21, 18, 0));
    assert_eq!(windows[0].end, utc(2024, 6, 21, 20, 0));
    assert!(windows[0].quality > 0.3);
}

#[tokio::test]
async fn test_night_range_has_no_windows() {
    let fx = fixture();
    fx.repo.insert_patio(open_patio(1, city_center()));

    let windows = fx
        .service
        .sun_windows(
            PatioId::new(1),
            utc(2024, 6, 21, 0, 0),
            utc(2024, 6, 21, 2, 0),
            30,
            5,
            &CancelToken::new(),
        )
        .await
        .unwrap();
    assert!(windows.is_empty());
}

#[tokio::test]
async fn test_compare_ranks_sunnier_patio_first() {
    let fx = fixture();
    let center = city_center();
    let shaded_center = geo_util::offset_point(center, 200.0, 0.0);
    fx.repo.insert_patio(open_patio(1, center));
    fx.repo.insert_patio(open_patio(2, shaded_center));
    // Tall building just south of patio 2; the low winter sun keeps it
    // in shadow all through the comparison range.
    fx.repo.insert_building(Building {
        id: BuildingId::new(1),
        footprint: square(geo_util::offset_point(shaded_center, 0.0, -25.0), 10.0),
        height_m: 40.0,
        height_source: HeightSource::Lidar,
        data_quality: 0.9,
    });

    let rankings = fx
        .service
        .compare(
            &[PatioId::new(1), PatioId::new(2)],
            utc(2024, 12, 21, 10, 30),
            utc(2024, 12, 21, 12, 0),
            30,
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(rankings.len(), 2);
    assert_eq!(rankings[0].patio_id, PatioId::new(1));
    assert!(rankings[0].score > rankings[1].score);

    let best = fx
        .service
        .find_best(
            &[PatioId::new(1), PatioId::new(2)],
            utc(2024, 12, 21, 10, 30),
            utc(2024, 12, 21, 12, 0),
            30,
            &CancelToken::new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(best.patio_id, PatioId::new(1));
}

#[tokio::test]
async fn test_find_best_with_no_candidates() {
    let fx = fixture();
    let best = fx
        .service
        .find_best(
            &[],
            utc(2024, 6, 21, 10, 0),
            utc(2024, 6, 21, 12, 0),
            30,
            &CancelToken::new(),
        )
        .await
        .unwrap();
    assert!(best.is_none());
}

#[tokio::test]
async fn test_cancelled_timeline_aborts_without_points() {
    let fx = fixture();
    fx.repo.insert_patio(open_patio(1, city_center()));

    let cancel = CancelToken::new();
    cancel.cancel();
    let result = fx
        .service
        .timeline(
            PatioId::new(1),
            utc(2024, 6, 21, 10, 0),
            utc(2024, 6, 21, 12, 0),
            30,
            &cancel,
        )
        .await;
    assert!(matches!(result, Err(CoreError::Cancelled(_))));
}
