//! Geospatial primitives and the location resolution capability.
//!
//! Resolution is the only I/O-bound step in an evaluation; the engine wraps
//! it in a timeout and treats failure as "unresolved" rather than an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in kilometers (haversine).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Name-to-coordinates capability. Implementations may block briefly (e.g. a
/// gazetteer lookup or geocoding call); the engine applies its own timeout.
pub trait LocationResolver: Send + Sync {
    /// Returns None when the name cannot be resolved.
    fn resolve(&self, name: &str) -> Option<GeoPoint>;
}

/// In-memory resolver backed by a fixed gazetteer, for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    places: HashMap<String, GeoPoint>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, name: &str, lat: f64, lon: f64) -> Self {
        self.places.insert(name.to_string(), GeoPoint::new(lat, lon));
        self
    }
}

impl LocationResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Option<GeoPoint> {
        self.places.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAIROBI: GeoPoint = GeoPoint { lat: -1.2921, lon: 36.8219 };
    const MOMBASA: GeoPoint = GeoPoint { lat: -4.0435, lon: 39.6682 };
    const LONDON: GeoPoint = GeoPoint { lat: 51.5074, lon: -0.1278 };

    #[test]
    fn test_distance_symmetric() {
        let ab = NAIROBI.distance_km(&MOMBASA);
        let ba = MOMBASA.distance_km(&NAIROBI);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_distance_zero_to_self() {
        assert!(NAIROBI.distance_km(&NAIROBI) < 1e-9);
    }

    #[test]
    fn test_known_distances() {
        // Nairobi-Mombasa is roughly 440 km, Nairobi-London roughly 6800 km.
        let near = NAIROBI.distance_km(&MOMBASA);
        assert!(near > 400.0 && near < 500.0, "got {near}");
        let far = NAIROBI.distance_km(&LONDON);
        assert!(far > 6500.0 && far < 7100.0, "got {far}");
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticResolver::new().with_place("Nairobi", -1.2921, 36.8219);
        assert!(resolver.resolve("Nairobi").is_some());
        assert!(resolver.resolve("Atlantis").is_none());
    }
}
