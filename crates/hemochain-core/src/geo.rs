use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Latitude/longitude in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl From<(f64, f64)> for GeoPoint {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self { latitude, longitude }
    }
}

/// Great-circle distance in kilometres (haversine).
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();

    c * EARTH_RADIUS_KM
}

pub fn within_range(a: GeoPoint, b: GeoPoint, max_km: f64) -> bool {
    distance_km(a, b) <= max_km
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NYC_DOWNTOWN: GeoPoint = GeoPoint { latitude: 40.7128, longitude: -74.0060 };
    const NYC_MIDTOWN: GeoPoint = GeoPoint { latitude: 40.7589, longitude: -73.9851 };

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(distance_km(NYC_DOWNTOWN, NYC_DOWNTOWN), 0.0);
    }

    #[test]
    fn test_manhattan_distance() {
        let d = distance_km(NYC_DOWNTOWN, NYC_MIDTOWN);
        assert!(d > 5.0 && d < 5.6, "got {}", d);
    }

    #[test]
    fn test_new_york_to_london() {
        let london = GeoPoint::new(51.5074, -0.1278);
        let d = distance_km(NYC_DOWNTOWN, london);
        assert!((d - 5570.0).abs() < 15.0, "got {}", d);
    }

    #[test]
    fn test_within_range() {
        assert!(within_range(NYC_DOWNTOWN, NYC_MIDTOWN, 100.0));
        assert!(!within_range(NYC_DOWNTOWN, NYC_MIDTOWN, 1.0));
    }

    proptest! {
        #[test]
        fn prop_distance_is_symmetric(
            lat1 in -90.0f64..90.0, lon1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0, lon2 in -180.0f64..180.0,
        ) {
            let a = GeoPoint::new(lat1, lon1);
            let b = GeoPoint::new(lat2, lon2);
            let ab = distance_km(a, b);
            prop_assert!((ab - distance_km(b, a)).abs() < 1e-6);
            prop_assert!(ab >= 0.0);
            prop_assert!(ab <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
        }
    }
}
