//! Odometer vs GPS distance reconciliation.
//!
//! Both distances are compared in the odometer's own unit. A discrepancy above
//! the tolerance is a distinguished outcome for the caller to resolve; this
//! module never picks a figure on its own.

use serde::{Deserialize, Serialize};

use crate::error::{RResult, RideTrackerError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceComparison {
    pub odometer_distance: f64,
    pub gps_distance: f64,
    /// Relative difference in percent of the larger distance
    pub discrepancy_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    Accepted(DistanceComparison),
    NeedsReconciliation(DistanceComparison),
}

impl ReconciliationOutcome {
    pub fn comparison(&self) -> &DistanceComparison {
        match self {
            ReconciliationOutcome::Accepted(c) | ReconciliationOutcome::NeedsReconciliation(c) => c,
        }
    }

    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, ReconciliationOutcome::NeedsReconciliation(_))
    }
}

/// Caller's answer to a `NeedsReconciliation` outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the submitted end odometer
    KeepOdometer,
    /// Rewrite the end odometer to start + GPS distance
    UseGps,
}

pub struct OdometerReconciler {
    tolerance: f64,
}

impl OdometerReconciler {
    /// `tolerance` is a fraction, 0.10 = 10%
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn reconcile(
        &self,
        start_odometer: f64,
        end_odometer: f64,
        gps_distance: f64,
    ) -> RResult<ReconciliationOutcome> {
        if !start_odometer.is_finite() || !end_odometer.is_finite() {
            return Err(RideTrackerError::InvalidOdometer(
                "odometer readings must be finite".to_string(),
            ));
        }
        let odometer_distance = end_odometer - start_odometer;
        if odometer_distance < 0.0 {
            return Err(RideTrackerError::InvalidOdometer(format!(
                "end odometer {} is below start odometer {}",
                end_odometer, start_odometer
            )));
        }

        let gps_distance = gps_distance.max(0.0);
        let larger = odometer_distance.max(gps_distance);
        let discrepancy = if larger > 0.0 {
            (odometer_distance - gps_distance).abs() / larger
        } else {
            0.0
        };

        let comparison = DistanceComparison {
            odometer_distance,
            gps_distance,
            discrepancy_pct: discrepancy * 100.0,
        };

        if discrepancy > self.tolerance {
            Ok(ReconciliationOutcome::NeedsReconciliation(comparison))
        } else {
            Ok(ReconciliationOutcome::Accepted(comparison))
        }
    }
}

impl Default for OdometerReconciler {
    fn default() -> Self {
        Self::new(0.10)
    }
}
