use serde::{Deserialize, Serialize};
use std::fs;

use super::state::{RecordingMode, RecordingState, SamplingPrecision};
use crate::reconciliation::DistanceComparison;
use crate::types::LocationSample;

/// Passive read model polled by the presentation layer
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RideSnapshot {
    pub timestamp: f64,
    pub state: RecordingState,
    pub mode: RecordingMode,
    pub precision: SamplingPrecision,
    pub ride_id: Option<String>,
    pub elapsed_secs: f64,
    pub moving_secs: f64,
    pub distance_m: f64,
    pub current_speed_kmh: f64,
    pub rolling_speed_kmh: f64,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub automotive_likely: bool,
    pub awaiting_start_confirmation: bool,
    pub pending_reconciliation: Option<DistanceComparison>,
    pub route: Vec<LocationSample>,
}

impl RideSnapshot {
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1000.0
    }
}
