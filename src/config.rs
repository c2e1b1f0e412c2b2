use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{RResult, RideTrackerError};
use crate::settlement::Money;
use crate::types::{METERS_PER_KM, METERS_PER_MILE};

/// Unit the mechanical odometer counts in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OdometerUnit {
    Kilometers,
    Miles,
}

impl OdometerUnit {
    pub fn from_meters(&self, meters: f64) -> f64 {
        match self {
            OdometerUnit::Kilometers => meters / METERS_PER_KM,
            OdometerUnit::Miles => meters / METERS_PER_MILE,
        }
    }
}

impl Default for OdometerUnit {
    fn default() -> Self {
        OdometerUnit::Kilometers
    }
}

/// Location filter thresholds
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub max_accuracy_m: f64,
    pub max_age_secs: f64,
    pub duplicate_distance_m: f64,
    pub duplicate_interval_secs: f64,
    pub max_speed_kmh: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 20.0,
            max_age_secs: 5.0,
            duplicate_distance_m: 1.0,
            duplicate_interval_secs: 1.0,
            max_speed_kmh: 200.0,
        }
    }
}

/// Recording engine thresholds and timers
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub filter: FilterConfig,
    /// Motion smoother window (events)
    pub motion_window: usize,
    /// Rolling speed buffer (samples)
    pub speed_window: usize,
    pub start_speed_kmh: f64,
    pub start_countdown_secs: f64,
    pub pause_speed_kmh: f64,
    pub pause_after_secs: f64,
    pub end_after_secs: f64,
    pub automatic: bool,
    pub odometer_unit: OdometerUnit,
    /// Relative discrepancy (0.10 = 10%) above which reconciliation is required
    pub reconciliation_tolerance: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            motion_window: 5,
            speed_window: 5,
            start_speed_kmh: 8.0,
            start_countdown_secs: 20.0,
            pause_speed_kmh: 2.0,
            pause_after_secs: 60.0,
            end_after_secs: 480.0,
            automatic: true,
            odometer_unit: OdometerUnit::Kilometers,
            reconciliation_tolerance: 0.10,
        }
    }
}

impl RecordingConfig {
    pub fn validate(&self) -> RResult<()> {
        if self.motion_window == 0 || self.speed_window == 0 {
            return Err(RideTrackerError::Config(
                "motion_window and speed_window must be at least 1".to_string(),
            ));
        }
        if self.filter.max_accuracy_m <= 0.0 || self.filter.max_speed_kmh <= 0.0 {
            return Err(RideTrackerError::Config(
                "filter ceilings must be positive".to_string(),
            ));
        }
        if self.pause_speed_kmh > self.start_speed_kmh {
            return Err(RideTrackerError::Config(format!(
                "pause_speed_kmh ({}) must not exceed start_speed_kmh ({})",
                self.pause_speed_kmh, self.start_speed_kmh
            )));
        }
        let timers = [
            self.start_countdown_secs,
            self.pause_after_secs,
            self.end_after_secs,
        ];
        if timers.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(RideTrackerError::Config(
                "timer durations must be non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.reconciliation_tolerance) {
            return Err(RideTrackerError::Config(
                "reconciliation_tolerance must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settlement solver tolerances
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Balances within this amount of zero count as settled
    pub epsilon: Money,
    /// Largest exact-split mismatch absorbed by the first participant
    pub rounding_tolerance: Money,
    /// Allowed deviation of percentage totals from 100
    pub percentage_tolerance: f64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            epsilon: Money::from_minor(1),
            rounding_tolerance: Money::from_minor(5),
            percentage_tolerance: 0.01,
        }
    }
}

/// Top-level configuration file layout
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub recording: RecordingConfig,
    pub settlement: SettlementConfig,
}

impl TrackerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> RResult<Self> {
        let json = fs::read_to_string(path)?;
        let config: TrackerConfig = serde_json::from_str(&json)?;
        config.recording.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecordingConfig::default();
        assert_eq!(config.filter.max_accuracy_m, 20.0);
        assert_eq!(config.motion_window, 5);
        assert_eq!(config.start_countdown_secs, 20.0);
        assert_eq!(config.end_after_secs, 480.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"recording": {"pause_after_secs": 30.0, "filter": {"max_accuracy_m": 15.0}}}"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.recording.pause_after_secs, 30.0);
        assert_eq!(config.recording.filter.max_accuracy_m, 15.0);
        assert_eq!(config.recording.filter.max_speed_kmh, 200.0);
        assert_eq!(config.settlement.epsilon, Money::from_minor(1));
    }

    #[test]
    fn test_validation_rejects_bad_windows() {
        let config = RecordingConfig {
            motion_window: 0,
            ..RecordingConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RecordingConfig {
            pause_speed_kmh: 10.0,
            ..RecordingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_odometer_unit_conversion() {
        assert_eq!(OdometerUnit::Kilometers.from_meters(12_300.0), 12.3);
        assert!((OdometerUnit::Miles.from_meters(1609.344) - 1.0).abs() < 1e-9);
    }
}
