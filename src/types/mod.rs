pub mod geodesy;

pub use geodesy::*;

use serde::{Deserialize, Serialize};

/// Location fix as delivered by the platform location provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Instantaneous speed in m/s; negative values mean "not reported"
    #[serde(default)]
    pub speed: Option<f64>,
    /// Course over ground in degrees
    #[serde(default)]
    pub heading: Option<f64>,
}

impl LocationSample {
    pub fn new(timestamp: f64, latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            accuracy,
            altitude: None,
            speed: None,
            heading: None,
        }
    }

    pub fn with_speed(mut self, speed_ms: f64) -> Self {
        self.speed = Some(speed_ms);
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Device-reported speed in m/s, if present and non-negative
    pub fn reported_speed(&self) -> Option<f64> {
        self.speed.filter(|s| s.is_finite() && *s >= 0.0)
    }

    pub fn distance_to(&self, other: &LocationSample) -> f64 {
        haversine_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Activity category reported by the platform motion classifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Automotive,
    Walking,
    Running,
    Cycling,
    Stationary,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Motion classification event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    pub timestamp: f64,
    pub activity: ActivityType,
    pub confidence: Confidence,
}

impl MotionEvent {
    pub fn new(timestamp: f64, activity: ActivityType, confidence: Confidence) -> Self {
        Self {
            timestamp,
            activity,
            confidence,
        }
    }

    /// Automotive with at least medium confidence
    pub fn is_automotive_likely(&self) -> bool {
        self.activity == ActivityType::Automotive && self.confidence != Confidence::Low
    }
}
