use serde::{Deserialize, Serialize};

/// Kilometers per degree of latitude (flat-earth approximation)
pub const KM_PER_DEG_LAT: f64 = 110.574;

/// Kilometers per degree of longitude at the equator
pub const KM_PER_DEG_LNG: f64 = 111.320;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that both values are finite and within the WGS84 domain
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && is_valid_lat(self.lat)
            && is_valid_lng(self.lng)
    }

    /// Degrees of longitude covered by one kilometer at this latitude
    pub fn lng_degrees_per_km(&self) -> f64 {
        // Clamp the cosine so the poles don't blow up to infinity
        let cos = self.lat.to_radians().cos().max(1e-6);
        1.0 / (KM_PER_DEG_LNG * cos)
    }

    /// Degrees of latitude covered by one kilometer
    pub fn lat_degrees_per_km() -> f64 {
        1.0 / KM_PER_DEG_LAT
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

pub fn is_valid_lat(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

pub fn is_valid_lng(lng: f64) -> bool {
    (-180.0..=180.0).contains(&lng)
}

/// Rounds a value to a fixed number of decimal places
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10_f64.powi(precision as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lng_creation() {
        let coord = LatLng::new(51.5074, -0.1278);
        assert_eq!(coord.lat, 51.5074);
        assert_eq!(coord.lng, -0.1278);
        assert!(coord.is_valid());
    }

    #[test]
    fn test_lat_lng_validation() {
        assert!(!LatLng::new(91.0, 0.0).is_valid());
        assert!(!LatLng::new(0.0, -180.5).is_valid());
        assert!(!LatLng::new(f64::NAN, 0.0).is_valid());
        assert!(LatLng::new(-90.0, 180.0).is_valid());
    }

    #[test]
    fn test_degrees_per_km_shrink_with_latitude() {
        let equator = LatLng::new(0.0, 0.0);
        let north = LatLng::new(60.0, 0.0);
        assert!(north.lng_degrees_per_km() > equator.lng_degrees_per_km());
        assert!((north.lng_degrees_per_km() - 2.0 * equator.lng_degrees_per_km()).abs() < 1e-6);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(51.50749, 3), 51.507);
        assert_eq!(round_to(-0.12751, 3), -0.128);
    }
}
