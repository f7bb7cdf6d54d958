//! Geodesy helpers
//!
//! Great-circle distance between two WGS84 positions and the coordinate
//! range checks shared by the location model.

mod bounds;

pub use bounds::GeoBounds;

use thiserror::Error;

/// Mean Earth radius in meters used by [`distance_meters`].
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Minimum valid latitude in degrees.
pub const MIN_LAT: f64 = -90.0;
/// Maximum valid latitude in degrees.
pub const MAX_LAT: f64 = 90.0;
/// Minimum valid longitude in degrees.
pub const MIN_LON: f64 = -180.0;
/// Maximum valid longitude in degrees.
pub const MAX_LON: f64 = 180.0;

/// Errors raised when a coordinate falls outside the WGS84 range.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordError {
    /// Latitude outside [-90, 90] or not a number.
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180] or not a number.
    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),
}

/// Checks that a latitude/longitude pair is a valid WGS84 position.
#[inline]
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    Ok(())
}

/// Great-circle distance in meters between two positions (Haversine).
///
/// Inputs are in degrees. NaN inputs propagate to a NaN result; there are
/// no other failure modes.
///
/// # Example
///
/// ```
/// use geotrack::geo::distance_meters;
///
/// // Paris to Lyon
/// let d = distance_meters(48.85, 2.35, 45.75, 4.83);
/// assert!((392_000.0..393_000.0).contains(&d));
/// ```
#[inline]
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let half_lat = (d_lat / 2.0).sin();
    let half_lon = (d_lon / 2.0).sin();

    let a = half_lat * half_lat
        + lat1.to_radians().cos() * lat2.to_radians().cos() * half_lon * half_lon;
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(distance_meters(48.85, 2.35, 48.85, 2.35), 0.0);
    }

    #[test]
    fn test_paris_to_lyon() {
        let d = distance_meters(48.85, 2.35, 45.75, 4.83);
        assert!(
            (392_000.0..393_000.0).contains(&d),
            "Expected ~392km, got {}m",
            d
        );
    }

    #[test]
    fn test_one_degree_of_latitude() {
        // 2πR / 360 ≈ 111.195 km
        let d = distance_meters(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.93).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_antipodal_points() {
        let d = distance_meters(0.0, 0.0, 0.0, 180.0);
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_METERS;
        assert!((d - half_circumference).abs() < 1.0);
    }

    #[test]
    fn test_crossing_antimeridian() {
        // 179.5°E to 179.5°W is one degree of longitude at the equator
        let d = distance_meters(0.0, 179.5, 0.0, -179.5);
        assert!((d - 111_194.93).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(distance_meters(f64::NAN, 0.0, 1.0, 1.0).is_nan());
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(90.0, 180.0).is_ok());
        assert!(validate_coordinates(-90.0, -180.0).is_ok());
        assert_eq!(
            validate_coordinates(90.5, 0.0),
            Err(CoordError::InvalidLatitude(90.5))
        );
        assert_eq!(
            validate_coordinates(0.0, -181.0),
            Err(CoordError::InvalidLongitude(-181.0))
        );
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_distance_is_symmetric(
                lat1 in -90.0..=90.0_f64,
                lon1 in -180.0..=180.0_f64,
                lat2 in -90.0..=90.0_f64,
                lon2 in -180.0..=180.0_f64
            ) {
                let ab = distance_meters(lat1, lon1, lat2, lon2);
                let ba = distance_meters(lat2, lon2, lat1, lon1);
                prop_assert!((ab - ba).abs() < 1e-6, "{} != {}", ab, ba);
            }

            #[test]
            fn test_distance_is_bounded(
                lat1 in -90.0..=90.0_f64,
                lon1 in -180.0..=180.0_f64,
                lat2 in -90.0..=90.0_f64,
                lon2 in -180.0..=180.0_f64
            ) {
                let d = distance_meters(lat1, lon1, lat2, lon2);
                let half_circumference = std::f64::consts::PI * EARTH_RADIUS_METERS;
                prop_assert!(d >= 0.0);
                prop_assert!(d <= half_circumference + 1e-6);
            }
        }
    }
}
