use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::LocationSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Start,
    Pause,
    Resume,
    End,
    OdometerSubmitted,
    Reconciled,
}

/// One lifecycle record; entries are only ever appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: f64,
    pub action: AuditAction,
    pub automatic: bool,
    pub reason: Option<String>,
}

/// One recorded trip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub ride_id: String,
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub start_odometer: f64,
    pub end_odometer: Option<f64>,
    pub gps_distance_m: f64,
    pub max_speed_kmh: f64,
    pub average_speed_kmh: f64,
    pub moving_secs: f64,
    pub route: Vec<LocationSample>,
    audit_log: Vec<AuditEntry>,
}

impl Ride {
    pub fn new(start_time: f64, start_odometer: f64) -> Self {
        Self {
            ride_id: format!("ride_{}", (start_time * 1000.0).round() as i64),
            start_time,
            end_time: None,
            start_odometer,
            end_odometer: None,
            gps_distance_m: 0.0,
            max_speed_kmh: 0.0,
            average_speed_kmh: 0.0,
            moving_secs: 0.0,
            route: Vec::new(),
            audit_log: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: AuditEntry) {
        self.audit_log.push(entry);
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }

    /// Route samples must arrive in strictly increasing time
    pub fn push_route(&mut self, sample: LocationSample) -> bool {
        if let Some(last) = self.route.last() {
            if sample.timestamp <= last.timestamp {
                return false;
            }
        }
        self.route.push(sample);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn odometer_distance(&self) -> Option<f64> {
        self.end_odometer.map(|end| end - self.start_odometer)
    }

    /// Start time rendered as RFC 3339
    pub fn started_at(&self) -> String {
        to_rfc3339(self.start_time)
    }

    pub fn ended_at(&self) -> Option<String> {
        self.end_time.map(to_rfc3339)
    }
}

pub fn to_rfc3339(timestamp: f64) -> String {
    let millis = (timestamp * 1000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_is_monotonic() {
        let mut ride = Ride::new(100.0, 15_000.0);
        assert!(ride.push_route(LocationSample::new(101.0, 40.0, -120.0, 5.0)));
        assert!(!ride.push_route(LocationSample::new(101.0, 40.0, -120.0, 5.0)));
        assert!(!ride.push_route(LocationSample::new(100.5, 40.0, -120.0, 5.0)));
        assert!(ride.push_route(LocationSample::new(102.0, 40.0, -120.0, 5.0)));
        assert_eq!(ride.route.len(), 2);
    }

    #[test]
    fn test_ride_id_and_times() {
        // 2025-11-19T09:00:00Z
        let ride = Ride::new(1_763_542_800.0, 15_000.0);
        assert_eq!(ride.ride_id, "ride_1763542800000");
        assert!(ride.started_at().starts_with("2025-11-19T09:00:00"));
        assert_eq!(ride.ended_at(), None);
        assert_eq!(ride.odometer_distance(), None);
    }
}
