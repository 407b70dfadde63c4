//! Small planar-geographic helpers shared by the shadow engine and the
//! spatial repositories.
//!
//! Footprints live in a geographic CRS (lon/lat degrees). Shadow lengths
//! and search radii are specified in meters, so conversions use the local
//! meters-per-degree scale at the latitude of interest. Good to well under
//! a meter at city scale, which is far below footprint digitization error.

use geo::{BoundingRect, Centroid, Point, Polygon};
use rstar::AABB;

/// Meters per degree of latitude (WGS84 mean).
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Meters per degree of longitude at the given latitude.
pub fn meters_per_degree_lon(latitude: f64) -> f64 {
    METERS_PER_DEGREE_LAT * latitude.to_radians().cos().max(1e-6)
}

/// Displace a lon/lat point by east/north offsets given in meters.
pub fn offset_point(point: Point<f64>, east_m: f64, north_m: f64) -> Point<f64> {
    let lat = point.y();
    Point::new(
        point.x() + east_m / meters_per_degree_lon(lat),
        point.y() + north_m / METERS_PER_DEGREE_LAT,
    )
}

/// Approximate planar distance in meters between two lon/lat points.
pub fn approx_distance_m(a: Point<f64>, b: Point<f64>) -> f64 {
    let mid_lat = (a.y() + b.y()) / 2.0;
    let dx = (a.x() - b.x()) * meters_per_degree_lon(mid_lat);
    let dy = (a.y() - b.y()) * METERS_PER_DEGREE_LAT;
    (dx * dx + dy * dy).sqrt()
}

/// Axis-aligned envelope of a polygon for R-tree insertion.
pub fn polygon_envelope(polygon: &Polygon<f64>) -> AABB<[f64; 2]> {
    match polygon.bounding_rect() {
        Some(rect) => AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        None => AABB::from_point([0.0, 0.0]),
    }
}

/// Envelope around a point expanded by a radius in meters.
pub fn search_envelope(center: Point<f64>, radius_m: f64) -> AABB<[f64; 2]> {
    let dlat = radius_m / METERS_PER_DEGREE_LAT;
    let dlon = radius_m / meters_per_degree_lon(center.y());
    AABB::from_corners(
        [center.x() - dlon, center.y() - dlat],
        [center.x() + dlon, center.y() + dlat],
    )
}

/// Centroid of a polygon, falling back to the first exterior vertex for
/// degenerate rings.
pub fn polygon_centroid(polygon: &Polygon<f64>) -> Point<f64> {
    polygon.centroid().unwrap_or_else(|| {
        polygon
            .exterior()
            .points()
            .next()
            .unwrap_or_else(|| Point::new(0.0, 0.0))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_offset_point_north() {
        let p = Point::new(11.97, 57.70);
        let moved = offset_point(p, 0.0, METERS_PER_DEGREE_LAT);
        assert!((moved.y() - 58.70).abs() < 1e-9);
        assert!((moved.x() - 11.97).abs() < 1e-9);
    }

    #[test]
    fn test_distance_roundtrip() {
        let p = Point::new(11.97, 57.70);
        let moved = offset_point(p, 100.0, 0.0);
        let dist = approx_distance_m(p, moved);
        assert!((dist - 100.0).abs() < 0.5, "distance was {}", dist);
    }

    #[test]
    fn test_polygon_envelope() {
        let poly = polygon![
            (x: 11.0, y: 57.0),
            (x: 12.0, y: 57.0),
            (x: 12.0, y: 58.0),
            (x: 11.0, y: 58.0),
        ];
        let env = polygon_envelope(&poly);
        assert_eq!(env.lower(), [11.0, 57.0]);
        assert_eq!(env.upper(), [12.0, 58.0]);
    }
}
