use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use geo::{LineString, Point, Polygon};

use crate::api::{
    Building, BuildingId, CancelToken, CoreError, ExposureState, HeightSource, Patio, PatioId,
    VenueId, WeatherObservation,
};
use crate::config::CoreConfig;
use crate::db::repositories::{LocalRepository, StaticWeatherProvider};
use crate::geo_util;
use crate::services::exposure::ExposureEngine;

const GOTHENBURG_LAT: f64 = 57.7089;
const GOTHENBURG_LON: f64 = 11.9746;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// Axis-aligned square footprint centered on a point, sized in meters.
fn square(center: Point<f64>, half_m: f64) -> Polygon<f64> {
    let corners = vec![
        geo_util::offset_point(center, -half_m, -half_m),
        geo_util::offset_point(center, half_m, -half_m),
        geo_util::offset_point(center, half_m, half_m),
        geo_util::offset_point(center, -half_m, half_m),
        geo_util::offset_point(center, -half_m, -half_m),
    ];
    Polygon::new(
        LineString::from(corners.into_iter().map(|p| (p.x(), p.y())).collect::<Vec<_>>()),
        vec![],
    )
}

fn patio_at(id: i64, center: Point<f64>) -> Patio {
    Patio {
        id: PatioId::new(id),
        venue_id: VenueId::new(id * 10),
        footprint: square(center, 5.0),
        height_m: 0.0,
        polygon_quality: 0.9,
    }
}

fn building_at(id: i64, center: Point<f64>, height_m: f64) -> Building {
    Building {
        id: BuildingId::new(id),
        footprint: square(center, 10.0),
        height_m,
        height_source: HeightSource::Lidar,
        data_quality: 0.9,
    }
}

struct Fixture {
    engine: ExposureEngine,
    repo: Arc<LocalRepository>,
    weather: Arc<StaticWeatherProvider>,
}

fn fixture() -> Fixture {
    let repo = Arc::new(LocalRepository::new());
    let weather = Arc::new(StaticWeatherProvider::new());
    let mut config = CoreConfig::default();
    config.location.latitude = GOTHENBURG_LAT;
    config.location.longitude = GOTHENBURG_LON;

    let engine = ExposureEngine::new(
        repo.clone(),
        repo.clone(),
        weather.clone(),
        config,
    );
    Fixture {
        engine,
        repo,
        weather,
    }
}

fn city_center() -> Point<f64> {
    Point::new(GOTHENBURG_LON, GOTHENBURG_LAT)
}

#[tokio::test]
async fn test_open_patio_fully_sunlit_at_noon() {
    let fx = fixture();
    fx.repo.insert_patio(patio_at(1, city_center()));

    let exposure = fx
        .engine
        .exposure(PatioId::new(1), utc(2024, 6, 21, 11, 15), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(exposure.state, ExposureState::Sunny);
    assert!((exposure.sunlit_pct - 100.0).abs() < 0.01);
    assert!((exposure.sunlit_pct + exposure.shaded_pct - 100.0).abs() < 0.01);
}

#[tokio::test]
async fn test_midnight_short_circuits_to_no_sun() {
    let fx = fixture();
    fx.repo.insert_patio(patio_at(1, city_center()));

    let exposure = fx
        .engine
        .exposure(PatioId::new(1), utc(2024, 6, 21, 0, 30), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(exposure.state, ExposureState::NoSun);
    assert_eq!(exposure.sunlit_pct, 0.0);
    assert_eq!(exposure.shaded_pct, 100.0);
    // Nighttime is certain regardless of data quality.
    assert!((exposure.confidence - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_low_winter_sun_building_shades_patio() {
    let fx = fixture();
    let center = city_center();
    // Tall building just south of the patio; the grazing winter sun from
    // the south throws its shadow well past the patio.
    fx.repo.insert_patio(patio_at(1, center));
    fx.repo
        .insert_building(building_at(1, geo_util::offset_point(center, 0.0, -25.0), 30.0));

    let exposure = fx
        .engine
        .exposure(PatioId::new(1), utc(2024, 12, 21, 11, 15), &CancelToken::new())
        .await
        .unwrap();

    assert!(
        exposure.sunlit_pct < 30.0,
        "expected heavy shading, got {}% sunlit",
        exposure.sunlit_pct
    );
    assert_eq!(exposure.state, ExposureState::Shaded);
    assert!((exposure.sunlit_pct + exposure.shaded_pct - 100.0).abs() < 0.01);
}

#[tokio::test]
async fn test_batch_matches_single_computation() {
    let fx = fixture();
    let center = city_center();
    fx.repo.insert_patio(patio_at(1, center));
    fx.repo
        .insert_patio(patio_at(2, geo_util::offset_point(center, 80.0, 0.0)));
    fx.repo
        .insert_building(building_at(1, geo_util::offset_point(center, 0.0, -25.0), 30.0));

    let ts = utc(2024, 12, 21, 11, 15);
    let batch = fx
        .engine
        .batch_exposure(&[PatioId::new(1), PatioId::new(2)], ts, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(batch.results.len(), 2);
    assert!(batch.failures.is_empty());

    for id in [PatioId::new(1), PatioId::new(2)] {
        let single = fx.engine.exposure(id, ts, &CancelToken::new()).await.unwrap();
        let from_batch = &batch.results[&id];
        assert_eq!(from_batch.sunlit_pct.to_bits(), single.sunlit_pct.to_bits());
        assert_eq!(from_batch.state, single.state);
        assert_eq!(from_batch.confidence.to_bits(), single.confidence.to_bits());
    }
}

#[tokio::test]
async fn test_batch_over_cap_rejected() {
    let fx = fixture();
    let ids: Vec<PatioId> = (0..101).map(PatioId::new).collect();

    let result = fx
        .engine
        .batch_exposure(&ids, utc(2024, 6, 21, 11, 0), &CancelToken::new())
        .await;
    assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_batch_captures_missing_patio_per_item() {
    let fx = fixture();
    fx.repo.insert_patio(patio_at(1, city_center()));

    let batch = fx
        .engine
        .batch_exposure(
            &[PatioId::new(1), PatioId::new(999)],
            utc(2024, 6, 21, 11, 0),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(batch.results.len(), 1);
    assert!(batch.results.contains_key(&PatioId::new(1)));
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].patio_id, PatioId::new(999));
    assert!(batch.failures[0].reason.starts_with("not_found"));
}

#[tokio::test]
async fn test_unknown_patio_is_not_found() {
    let fx = fixture();
    let result = fx
        .engine
        .exposure(PatioId::new(42), utc(2024, 6, 21, 11, 0), &CancelToken::new())
        .await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_cancelled_single_lookup_aborts() {
    let fx = fixture();
    fx.repo.insert_patio(patio_at(1, city_center()));

    let cancel = CancelToken::new();
    cancel.cancel();
    let result = fx
        .engine
        .exposure(PatioId::new(1), utc(2024, 6, 21, 11, 0), &cancel)
        .await;
    assert!(matches!(result, Err(CoreError::Cancelled(_))));
}

#[tokio::test]
async fn test_cancelled_batch_marks_items_cancelled() {
    let fx = fixture();
    fx.repo.insert_patio(patio_at(1, city_center()));

    let cancel = CancelToken::new();
    cancel.cancel();
    let batch = fx
        .engine
        .batch_exposure(&[PatioId::new(1)], utc(2024, 6, 21, 11, 0), &cancel)
        .await
        .unwrap();

    assert!(batch.results.is_empty());
    assert_eq!(batch.failures.len(), 1);
    assert!(batch.failures[0].reason.starts_with("cancelled"));
}

#[tokio::test]
async fn test_weather_outage_degrades_instead_of_failing() {
    let fx = fixture();
    fx.repo.insert_patio(patio_at(1, city_center()));
    fx.weather.set_available(false);

    let exposure = fx
        .engine
        .exposure(PatioId::new(1), utc(2024, 6, 21, 11, 15), &CancelToken::new())
        .await
        .unwrap();

    assert!(!exposure.factors.weather_available);
    assert_eq!(exposure.state, ExposureState::Sunny);
}

#[tokio::test]
async fn test_cloud_cover_lowers_confidence() {
    let fx = fixture();
    fx.repo.insert_patio(patio_at(1, city_center()));
    let ts = utc(2024, 6, 21, 11, 15);

    fx.weather.set_observation(Some(WeatherObservation {
        cloud_cover: 0.0,
        visibility_km: 20.0,
        source: "test".into(),
        observed_at: ts,
    }));
    let clear = fx.engine.exposure(PatioId::new(1), ts, &CancelToken::new()).await.unwrap();

    fx.weather.set_observation(Some(WeatherObservation {
        cloud_cover: 0.9,
        visibility_km: 5.0,
        source: "test".into(),
        observed_at: ts,
    }));
    let overcast = fx.engine.exposure(PatioId::new(1), ts, &CancelToken::new()).await.unwrap();

    assert!(overcast.confidence < clear.confidence);
    assert!(clear.factors.weather_available && overcast.factors.weather_available);
}
