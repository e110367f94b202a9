//! Great-circle distance and bounding-box helpers
//!
//! All coordinates are WGS84 degrees. Distances are kilometers.

use crate::domain::types::Location;

/// Mean Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points using the haversine formula
pub fn haversine_km(a: &Location, b: &Location) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Inclusive bounding-box membership test
pub fn within_bbox(
    point: &Location,
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
) -> bool {
    point.lon >= min_lon && point.lon <= max_lon && point.lat >= min_lat && point.lat <= max_lat
}

/// Bounding box of a route geometry as (min_lon, min_lat, max_lon, max_lat)
///
/// Returns None for an empty geometry.
pub fn bounding_box(points: &[Location]) -> Option<(f64, f64, f64, f64)> {
    let first = points.first()?;
    let mut bbox = (first.lon, first.lat, first.lon, first.lat);
    for p in &points[1..] {
        bbox.0 = bbox.0.min(p.lon);
        bbox.1 = bbox.1.min(p.lat);
        bbox.2 = bbox.2.max(p.lon);
        bbox.3 = bbox.3.max(p.lat);
    }
    Some(bbox)
}
