use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::RResult;
use crate::providers::current_timestamp;
use crate::recording::ride::to_rfc3339;
use crate::recording::Ride;
use crate::settlement::SettlementPlan;
use crate::types::METERS_PER_KM;

/// Finalized ride handed to persistence/sync collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideExport {
    pub exported_at: String,
    pub summary: RideSummary,
    pub ride: Ride,
}

impl RideExport {
    pub fn new(ride: Ride) -> Self {
        Self {
            exported_at: to_rfc3339(current_timestamp()),
            summary: RideSummary::from_ride(&ride),
            ride,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> RResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize to JSON bytes
    pub fn to_json_bytes(&self) -> RResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(json: &str) -> RResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> RResult<()> {
        fs::write(path, self.to_json_bytes()?)?;
        Ok(())
    }
}

/// Ride statistics for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideSummary {
    pub ride_id: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_secs: Option<f64>,
    pub moving_secs: f64,
    pub gps_distance_km: f64,
    pub odometer_distance: Option<f64>,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub route_points: usize,
    pub audit_entries: usize,
}

impl RideSummary {
    pub fn from_ride(ride: &Ride) -> Self {
        RideSummary {
            ride_id: ride.ride_id.clone(),
            started_at: ride.started_at(),
            ended_at: ride.ended_at(),
            duration_secs: ride.end_time.map(|end| end - ride.start_time),
            moving_secs: ride.moving_secs,
            gps_distance_km: ride.gps_distance_m / METERS_PER_KM,
            odometer_distance: ride.odometer_distance(),
            average_speed_kmh: ride.average_speed_kmh,
            max_speed_kmh: ride.max_speed_kmh,
            route_points: ride.route.len(),
            audit_entries: ride.audit_log().len(),
        }
    }
}

/// Settlement plan export for the expense-sharing collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementExport {
    pub exported_at: String,
    pub plan: SettlementPlan,
}

impl SettlementExport {
    pub fn new(plan: SettlementPlan) -> Self {
        Self {
            exported_at: to_rfc3339(current_timestamp()),
            plan,
        }
    }

    pub fn to_json(&self) -> RResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> RResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{AuditAction, AuditEntry};
    use crate::types::LocationSample;
    use approx::assert_relative_eq;

    fn finished_ride() -> Ride {
        let mut ride = Ride::new(1_763_542_800.0, 15_000.0);
        ride.record(AuditEntry {
            timestamp: ride.start_time,
            action: AuditAction::Start,
            automatic: false,
            reason: None,
        });
        ride.push_route(LocationSample::new(1_763_542_801.0, 40.0, -120.0, 5.0).with_altitude(100.0));
        ride.push_route(LocationSample::new(1_763_542_802.0, 40.0001, -120.0, 5.0));
        ride.gps_distance_m = 12_300.0;
        ride.end_time = Some(1_763_543_700.0);
        ride.end_odometer = Some(15_013.0);
        ride
    }

    #[test]
    fn test_ride_export_json() {
        let export = RideExport::new(finished_ride());
        let json = export.to_json().unwrap();
        assert!(json.contains("ride_1763542800000"));

        let parsed = RideExport::from_json(&json).unwrap();
        assert_eq!(parsed.ride.audit_log().len(), 1);
        assert_eq!(parsed.summary.ride_id, export.summary.ride_id);
        assert_eq!(parsed.summary.route_points, 2);
    }

    #[test]
    fn test_summary_fields() {
        let summary = RideSummary::from_ride(&finished_ride());
        assert_relative_eq!(summary.gps_distance_km, 12.3);
        assert_eq!(summary.duration_secs, Some(900.0));
        assert_eq!(summary.odometer_distance, Some(13.0));
        assert_eq!(summary.route_points, 2);
        assert!(summary.ended_at.unwrap().starts_with("2025-11-19T09:15:00"));
    }

    #[test]
    fn test_settlement_export_json() {
        use crate::settlement::{Expense, Member, Money, SettlementSolver, SplitRule};

        let members: Vec<Member> = ["A", "B"].iter().map(|id| Member::new(id, id)).collect();
        let expenses = vec![Expense::new("fuel", "A", Money::from_minor(5000), SplitRule::Equal, &["A", "B"])];
        let plan = SettlementSolver::default().plan(&expenses, &members).unwrap();

        let json = SettlementExport::new(plan).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["plan"]["settlements"][0]["from"], "B");
        assert_eq!(value["plan"]["settlements"][0]["amount"], 25.0);
        assert!(value["exported_at"].as_str().unwrap().contains('T'));
    }
}
