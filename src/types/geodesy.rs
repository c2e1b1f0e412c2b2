//! Geodesy helpers shared by the location filter and the integrator.
//!
//! Distances are great-circle (haversine) in meters, speeds are exchanged
//! in km/h at the configuration boundary and m/s on the sensor side.

use geo::{HaversineDistance, Point};

// ===== Unit Conversions =====
pub const MS_TO_KMH: f64 = 3.6;
pub const METERS_PER_KM: f64 = 1000.0;
pub const METERS_PER_MILE: f64 = 1609.344;

/// Great-circle distance in meters between two WGS84 positions (degrees).
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    // geo points are (x = lon, y = lat)
    let a = Point::new(lon1, lat1);
    let b = Point::new(lon2, lat2);
    a.haversine_distance(&b)
}

pub fn ms_to_kmh(speed_ms: f64) -> f64 {
    speed_ms * MS_TO_KMH
}

pub fn kmh_to_ms(speed_kmh: f64) -> f64 {
    speed_kmh / MS_TO_KMH
}
