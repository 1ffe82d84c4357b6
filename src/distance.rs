//! Great-circle distance between two coordinates.

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres.
///
/// Inputs are degrees and are not range checked; callers supply valid
/// coordinates. Identical points yield exactly `0.0`.
pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `a` just past 1.0 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS: [(f64, f64); 6] = [
        (0.0, 0.0),
        (51.5074, -0.1278),
        (21.4225, 39.8262),
        (-33.8688, 151.2093),
        (89.9, 179.9),
        (-90.0, -180.0),
    ];

    #[test]
    fn test_same_point_is_zero() {
        for (lat, lng) in POINTS {
            assert_eq!(distance_km(lat, lng, lat, lng), 0.0);
        }
    }

    #[test]
    fn test_symmetric() {
        for (lat1, lng1) in POINTS {
            for (lat2, lng2) in POINTS {
                let forward = distance_km(lat1, lng1, lat2, lng2);
                let backward = distance_km(lat2, lng2, lat1, lng1);
                assert!((forward - backward).abs() < 1e-9);
                assert!(forward >= 0.0);
            }
        }
    }

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        let km = distance_km(0.0, 0.0, 0.0, 1.0);
        assert!((km - 111.19).abs() < 0.5, "got {}", km);
    }

    #[test]
    fn test_london_to_mecca() {
        // ~4,790 km along the great circle
        let km = distance_km(51.5074, -0.1278, 21.4225, 39.8262);
        assert!((km - 4790.0).abs() < 30.0, "got {}", km);
    }

    #[test]
    fn test_antipodal_points_stay_finite() {
        let km = distance_km(0.0, 0.0, 0.0, 180.0);
        assert!(km.is_finite());
        assert!((km - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }
}
