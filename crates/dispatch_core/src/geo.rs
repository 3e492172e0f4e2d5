//! Geographic primitives: coordinates and the two distance metrics used by the engine.
//!
//! Matching and movement use **planar** distance in raw degree space (cheap and
//! consistent with straight-line interpolation). Trip records use **haversine**
//! distance via `h3o` so reported kilometres are meaningful.

use h3o::LatLng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite and inside the valid lat/lng ranges.
    pub fn is_well_formed(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Euclidean distance in degree space.
    pub fn planar_distance(&self, other: &Coordinate) -> f64 {
        let d_lat = self.lat - other.lat;
        let d_lng = self.lng - other.lng;
        d_lat.hypot(d_lng)
    }

    /// Great-circle distance in kilometres. Returns `None` for malformed points.
    pub fn haversine_km(&self, other: &Coordinate) -> Option<f64> {
        let a = LatLng::new(self.lat, self.lng).ok()?;
        let b = LatLng::new(other.lat, other.lng).ok()?;
        Some(a.distance_km(b))
    }
}

/// Total haversine length of a polyline in kilometres; malformed segments count as zero.
pub fn path_length_km(path: &[Coordinate]) -> f64 {
    path.windows(2)
        .filter_map(|pair| pair[0].haversine_km(&pair[1]))
        .sum()
}

/// Quantized cache key: every point rounded to `precision` decimals, joined with `;`.
pub fn quantized_key(points: &[Coordinate], precision: usize) -> String {
    points
        .iter()
        .map(|p| format!("{:.*},{:.*}", precision, p.lat, precision, p.lng))
        .collect::<Vec<_>>()
        .join(";")
}
