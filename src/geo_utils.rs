//! # Geographic Utilities
//!
//! Coordinate helpers shared by trace deduplication, segment resolution and the
//! read side.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a trace in meters |
//! | [`compute_bounds`] | Bounding box of a trace |
//! | [`snap_to_grid`] | Round a point onto a fixed degree grid |
//! | [`coord_key`] | Exact `"lat_lng"` identity string for a point |
//!
//! ## Example
//!
//! ```rust
//! use parkpal_engine::{GpsPoint, geo_utils};
//!
//! let trace = vec![
//!     GpsPoint::new(40.4406, -79.9959),
//!     GpsPoint::new(40.4410, -79.9962),
//! ];
//!
//! let length = geo_utils::polyline_length(&trace);
//! assert!(length > 0.0 && length < 100.0);
//!
//! assert_eq!(geo_utils::coord_key(&trace[0]), "40.4406_-79.9959");
//! ```
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees), which is the
//! standard used by GPS receivers and road snapping services.

use geo::{Distance, Haversine, Point};

use crate::{Bounds, GpsPoint};

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in meters between two GPS points.
///
/// ```rust
/// use parkpal_engine::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Total length of a trace in meters. Empty or single-point traces return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Bounding box enclosing every point of a trace.
///
/// For empty input the bounds are inverted (MAX/MIN) and contain nothing.
pub fn compute_bounds(points: &[GpsPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

// =============================================================================
// Identity Functions
// =============================================================================

/// Round a point onto a grid of `cell_deg` degrees in each axis.
///
/// Points closer together than half a cell collapse to the same coordinate,
/// which absorbs GPS jitter before segment lookup. Non-positive or non-finite
/// cell sizes return the point unchanged.
///
/// ```rust
/// use parkpal_engine::{GpsPoint, geo_utils};
///
/// let a = geo_utils::snap_to_grid(&GpsPoint::new(40.44061, -79.99589), 0.0001);
/// let b = geo_utils::snap_to_grid(&GpsPoint::new(40.44059, -79.99591), 0.0001);
/// assert_eq!(a, b);
/// ```
pub fn snap_to_grid(point: &GpsPoint, cell_deg: f64) -> GpsPoint {
    if !(cell_deg.is_finite() && cell_deg > 0.0) {
        return *point;
    }

    // Round through the inverse so 0.0001 grids print as 4-decimal values.
    // Adding 0.0 folds the -0.0 produced by rounding small negatives.
    let inv = (1.0 / cell_deg).round();
    if inv >= 1.0 && ((1.0 / inv) - cell_deg).abs() < f64::EPSILON * 16.0 {
        return GpsPoint::new(
            (point.latitude * inv).round() / inv + 0.0,
            (point.longitude * inv).round() / inv + 0.0,
        );
    }

    GpsPoint::new(
        (point.latitude / cell_deg).round() * cell_deg + 0.0,
        (point.longitude / cell_deg).round() * cell_deg + 0.0,
    )
}

/// Exact identity string `"lat_lng"` for a point.
///
/// Uses the shortest decimal rendering that round-trips the `f64`, so two
/// points share a key exactly when their coordinates compare equal.
pub fn coord_key(point: &GpsPoint) -> String {
    // -0.0 + 0.0 == +0.0, so both zeros render as "0".
    format!("{}_{}", point.latitude + 0.0, point.longitude + 0.0)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GpsPoint::new(40.4406, -79.9959);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_known_value() {
        let london = GpsPoint::new(51.5074, -0.1278);
        let paris = GpsPoint::new(48.8566, 2.3522);
        let dist = haversine_distance(&london, &paris);
        assert!(approx_eq(dist, 343_560.0, 5000.0));
    }

    #[test]
    fn test_polyline_length_short_traces() {
        let empty: Vec<GpsPoint> = vec![];
        assert_eq!(polyline_length(&empty), 0.0);
        assert_eq!(polyline_length(&[GpsPoint::new(40.0, -80.0)]), 0.0);
    }

    #[test]
    fn test_compute_bounds() {
        let trace = vec![
            GpsPoint::new(40.44, -80.00),
            GpsPoint::new(40.45, -79.99),
            GpsPoint::new(40.445, -79.995),
        ];
        let bounds = compute_bounds(&trace);
        assert_eq!(bounds.min_lat, 40.44);
        assert_eq!(bounds.max_lat, 40.45);
        assert_eq!(bounds.min_lng, -80.00);
        assert_eq!(bounds.max_lng, -79.99);
    }

    #[test]
    fn test_snap_to_grid() {
        let snapped = snap_to_grid(&GpsPoint::new(40.44063, -79.99587), 0.0001);
        assert_eq!(snapped, GpsPoint::new(40.4406, -79.9959));

        let p = GpsPoint::new(40.44063, -79.99587);
        assert_eq!(snap_to_grid(&p, 0.0), p);
        assert_eq!(snap_to_grid(&p, f64::NAN), p);
    }

    #[test]
    fn test_snap_to_grid_merges_across_prime_meridian() {
        let west = snap_to_grid(&GpsPoint::new(51.4779, -0.00004), 0.0001);
        let east = snap_to_grid(&GpsPoint::new(51.4779, 0.00004), 0.0001);
        assert!(west.longitude.is_sign_positive());
        assert_eq!(coord_key(&west), coord_key(&east));
        assert_eq!(coord_key(&west), "51.4779_0");

        let south = snap_to_grid(&GpsPoint::new(-0.00004, 10.0), 0.0001);
        assert_eq!(coord_key(&south), "0_10");
    }

    #[test]
    fn test_coord_key() {
        assert_eq!(coord_key(&GpsPoint::new(40.4406, -79.9959)), "40.4406_-79.9959");
        assert_eq!(coord_key(&GpsPoint::new(1.0, 2.5)), "1_2.5");
        assert_ne!(
            coord_key(&GpsPoint::new(40.4406, -79.9959)),
            coord_key(&GpsPoint::new(40.44060001, -79.9959))
        );
    }

    #[test]
    fn test_coord_key_signed_zero() {
        assert_eq!(coord_key(&GpsPoint::new(-0.0, 10.0)), coord_key(&GpsPoint::new(0.0, 10.0)));
        assert_eq!(coord_key(&GpsPoint::new(0.0, -0.0)), "0_0");
    }
}
