//! Geodesic helpers shared by the candidate store filter and the scorer.
//!
//! Both sides must agree on distance, so the haversine formula lives here
//! rather than in either consumer.

use serde::{Deserialize, Serialize};

use crate::constants::EARTH_RADIUS_KM;
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, ParseError> {
        if !lat.is_finite() || !lng.is_finite() || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lng)
        {
            return Err(ParseError::InvalidCoordinates { lat, lng });
        }
        Ok(Self { lat, lng })
    }

    /// Great-circle distance in kilometres on a sphere of Earth's mean radius.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self, other)
    }
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // clamp guards asin against rounding just above 1.0 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Coarse lat/lng rectangle enclosing a circle, used to pre-filter rows
/// before the exact haversine check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(center: &GeoPoint, radius_km: f64) -> Self {
        let radius_km = radius_km.max(0.0);
        let d_lat = (radius_km / EARTH_RADIUS_KM).to_degrees();
        let min_lat = (center.lat - d_lat).max(-90.0);
        let max_lat = (center.lat + d_lat).min(90.0);

        // Near a pole every longitude is within reach.
        if min_lat <= -90.0 || max_lat >= 90.0 {
            return Self {
                min_lat,
                max_lat,
                min_lng: -180.0,
                max_lng: 180.0,
            };
        }

        let cos_lat = center.lat.to_radians().cos().max(1e-12);
        let d_lng = (radius_km / (EARTH_RADIUS_KM * cos_lat)).to_degrees();
        if d_lng >= 180.0 {
            return Self {
                min_lat,
                max_lat,
                min_lng: -180.0,
                max_lng: 180.0,
            };
        }

        let mut min_lng = center.lng - d_lng;
        let mut max_lng = center.lng + d_lng;
        if min_lng < -180.0 {
            min_lng += 360.0;
        }
        if max_lng > 180.0 {
            max_lng -= 360.0;
        }

        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    /// True when the longitude range crosses the antimeridian, in which case
    /// `min_lng > max_lng` and membership is `lng >= min_lng || lng <= max_lng`.
    pub fn wraps_antimeridian(&self) -> bool {
        self.min_lng > self.max_lng
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        let lat_ok = point.lat >= self.min_lat && point.lat <= self.max_lat;
        let lng_ok = if self.wraps_antimeridian() {
            point.lng >= self.min_lng || point.lng <= self.max_lng
        } else {
            point.lng >= self.min_lng && point.lng <= self.max_lng
        };
        lat_ok && lng_ok
    }
}
