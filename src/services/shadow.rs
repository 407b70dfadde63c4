//! Shadow casting engine.
//!
//! Projects building footprints into ground-plane shadow polygons for a
//! given solar position, and intersects shadow unions with patio polygons
//! to split their area into sunlit and shaded fractions. This is the
//! performance-critical heart of the exposure pipeline; geometry failures
//! surface as `ComputationFailure` so batch operations keep partial
//! success instead of aborting.

use geo::{Area, BooleanOps, ConvexHull, MultiPoint, MultiPolygon, Point, Polygon};

use crate::api::{Building, CoreError, CoreResult, ShadowProjection, SolarPosition};
use crate::config::ShadowSettings;
use crate::db::repository::BuildingRepository;
use crate::geo_util;

/// Project one building's shadow for a solar position.
///
/// Returns `None` when the sun is at or below the horizon: there is no
/// physically meaningful shadow, and the "everything is shaded" case is
/// handled at the orchestrator level. Elevations above the near-vertical
/// threshold collapse the projection onto the footprint itself instead of
/// dividing by tan(~90 deg).
pub fn cast_shadow(
    building: &Building,
    solar: &SolarPosition,
    settings: &ShadowSettings,
) -> Option<ShadowProjection> {
    if solar.elevation_deg <= 0.0 {
        return None;
    }

    if solar.elevation_deg >= settings.near_vertical_deg {
        return Some(ShadowProjection {
            building_id: building.id,
            polygon: building.footprint.clone(),
            solar_elevation_deg: solar.elevation_deg,
        });
    }

    let length_m = (building.height_m / solar.elevation_deg.to_radians().tan())
        .min(settings.max_shadow_length_m);

    // Shadow extends away from the sun.
    let bearing_rad = (solar.azimuth_deg + 180.0).rem_euclid(360.0).to_radians();
    let east_m = bearing_rad.sin() * length_m;
    let north_m = bearing_rad.cos() * length_m;

    let mut hull_points: Vec<Point<f64>> = building.footprint.exterior().points().collect();
    let displaced: Vec<Point<f64>> = hull_points
        .iter()
        .map(|p| geo_util::offset_point(*p, east_m, north_m))
        .collect();
    hull_points.extend(displaced);

    // Convex hull of original + displaced vertices. A simplification of the
    // exact extruded silhouette that slightly over-covers for concave
    // footprints, which biases toward "shaded" rather than false sun.
    let polygon = MultiPoint::from(hull_points).convex_hull();

    Some(ShadowProjection {
        building_id: building.id,
        polygon,
        solar_elevation_deg: solar.elevation_deg,
    })
}

/// Cast shadows for every building within `radius_m` of `center`.
///
/// The spatial lookup is delegated to the building repository; buildings
/// whose projection cannot be computed are skipped (sun below horizon
/// yields an empty vec).
pub async fn all_shadows(
    solar: &SolarPosition,
    center: Point<f64>,
    radius_m: f64,
    buildings: &dyn BuildingRepository,
    settings: &ShadowSettings,
) -> CoreResult<Vec<ShadowProjection>> {
    if solar.elevation_deg <= 0.0 {
        return Ok(Vec::new());
    }

    let candidates = buildings.buildings_near(center, radius_m).await?;
    Ok(candidates
        .iter()
        .filter_map(|b| cast_shadow(b, solar, settings))
        .collect())
}

/// Split a patio's area into (sunlit %, shaded %) under a set of shadows.
///
/// Percentages always sum to 100 within floating-point tolerance.
/// Degenerate patio geometry (zero area, non-finite coordinates) is a
/// `ComputationFailure`, not a panic, so callers can report partial
/// success for batches.
pub fn patio_shadow_coverage(
    patio_polygon: &Polygon<f64>,
    shadows: &[ShadowProjection],
) -> CoreResult<(f64, f64)> {
    validate_polygon(patio_polygon, "patio")?;
    let patio_area = patio_polygon.unsigned_area();

    if shadows.is_empty() {
        return Ok((100.0, 0.0));
    }

    let mut shadow_union: Option<MultiPolygon<f64>> = None;
    for shadow in shadows {
        validate_polygon(&shadow.polygon, "shadow")?;
        let piece = MultiPolygon::new(vec![shadow.polygon.clone()]);
        shadow_union = Some(match shadow_union {
            Some(current) => current.union(&piece),
            None => piece,
        });
    }

    let shaded_area = match shadow_union {
        Some(union) => union
            .intersection(&MultiPolygon::new(vec![patio_polygon.clone()]))
            .unsigned_area(),
        None => 0.0,
    };

    let shaded_pct = (shaded_area / patio_area * 100.0).clamp(0.0, 100.0);
    Ok((100.0 - shaded_pct, shaded_pct))
}

/// Reject polygons the boolean-ops kernel cannot meaningfully process.
fn validate_polygon(polygon: &Polygon<f64>, label: &str) -> CoreResult<()> {
    let exterior = polygon.exterior();
    if exterior.0.len() < 4 {
        // A closed ring needs at least 3 distinct vertices.
        return Err(CoreError::ComputationFailure(format!(
            "{} polygon has fewer than 3 vertices",
            label
        )));
    }
    if exterior
        .coords()
        .any(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        return Err(CoreError::ComputationFailure(format!(
            "{} polygon contains non-finite coordinates",
            label
        )));
    }
    if polygon.unsigned_area() <= 0.0 {
        return Err(CoreError::ComputationFailure(format!(
            "{} polygon has zero area",
            label
        )));
    }
    Ok(())
}
