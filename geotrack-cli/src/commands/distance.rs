//! Distance command - great-circle distance between two coordinates.

use geotrack::geo::{distance_meters, validate_coordinates};

use crate::error::CliError;

/// Run the distance command.
pub fn run(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<(), CliError> {
    validate_coordinates(lat1, lon1)?;
    validate_coordinates(lat2, lon2)?;

    let meters = distance_meters(lat1, lon1, lat2, lon2);
    println!("{}", format_distance(meters));
    Ok(())
}

/// Human-readable distance: meters below one kilometer, kilometers above.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.1} m", meters)
    } else {
        format!("{:.3} km", meters / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(0.0), "0.0 m");
        assert_eq!(format_distance(999.94), "999.9 m");
        assert_eq!(format_distance(1000.0), "1.000 km");
        assert_eq!(format_distance(392_417.5), "392.418 km");
    }

    #[test]
    fn test_rejects_invalid_coordinates() {
        assert!(matches!(
            run(91.0, 0.0, 0.0, 0.0),
            Err(CliError::Coordinates(_))
        ));
        assert!(matches!(
            run(0.0, 0.0, 0.0, -181.0),
            Err(CliError::Coordinates(_))
        ));
    }

    #[test]
    fn test_valid_coordinates() {
        assert!(run(48.85, 2.35, 45.75, 4.83).is_ok());
    }
}
