use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::FilterConfig;
use crate::types::{ms_to_kmh, LocationSample};

/// Why a location sample was dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidCoordinates,
    InvalidAccuracy,
    LowAccuracy,
    Stale,
    Duplicate,
    OutOfOrder,
    ImplausibleSpeed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RejectReason::InvalidCoordinates => "invalid coordinates",
            RejectReason::InvalidAccuracy => "invalid accuracy",
            RejectReason::LowAccuracy => "accuracy above ceiling",
            RejectReason::Stale => "stale",
            RejectReason::Duplicate => "duplicate",
            RejectReason::OutOfOrder => "out of order",
            RejectReason::ImplausibleSpeed => "implausible speed",
        };
        f.write_str(label)
    }
}

/// Gate in front of the integrator: drops inaccurate, stale, duplicate and
/// teleporting fixes. Accepted samples become the comparison reference.
pub struct LocationFilter {
    config: FilterConfig,
    last_accepted: Option<LocationSample>,
    accepted_count: u64,
    rejections: HashMap<RejectReason, u64>,
}

impl LocationFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            last_accepted: None,
            accepted_count: 0,
            rejections: HashMap::new(),
        }
    }

    /// Check a sample without touching the reference
    pub fn evaluate(&self, sample: &LocationSample, now: f64) -> Result<(), RejectReason> {
        let coords_ok = sample.latitude.is_finite()
            && sample.longitude.is_finite()
            && sample.latitude.abs() <= 90.0
            && sample.longitude.abs() <= 180.0;
        if !coords_ok || !sample.timestamp.is_finite() {
            return Err(RejectReason::InvalidCoordinates);
        }

        if !sample.accuracy.is_finite() || sample.accuracy <= 0.0 {
            return Err(RejectReason::InvalidAccuracy);
        }
        if sample.accuracy > self.config.max_accuracy_m {
            return Err(RejectReason::LowAccuracy);
        }

        if now - sample.timestamp > self.config.max_age_secs {
            return Err(RejectReason::Stale);
        }

        let last = match &self.last_accepted {
            Some(last) => last,
            None => return Ok(()),
        };

        let dt = sample.timestamp - last.timestamp;
        let distance = last.distance_to(sample);

        if distance < self.config.duplicate_distance_m && dt.abs() < self.config.duplicate_interval_secs {
            return Err(RejectReason::Duplicate);
        }
        if dt <= 0.0 {
            return Err(RejectReason::OutOfOrder);
        }

        let implied_kmh = ms_to_kmh(distance / dt);
        if implied_kmh > self.config.max_speed_kmh {
            return Err(RejectReason::ImplausibleSpeed);
        }

        Ok(())
    }

    /// Returns true and adopts the sample as the new reference if it passes
    pub fn accept(&mut self, sample: &LocationSample, now: f64) -> bool {
        match self.evaluate(sample, now) {
            Ok(()) => {
                self.last_accepted = Some(sample.clone());
                self.accepted_count += 1;
                true
            }
            Err(reason) => {
                log::debug!(
                    "rejected location at t={:.1} ({:.6}, {:.6}) acc={:.1}m: {}",
                    sample.timestamp,
                    sample.latitude,
                    sample.longitude,
                    sample.accuracy,
                    reason
                );
                *self.rejections.entry(reason).or_insert(0) += 1;
                false
            }
        }
    }

    pub fn last_accepted(&self) -> Option<&LocationSample> {
        self.last_accepted.as_ref()
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted_count
    }

    pub fn rejected_count(&self, reason: RejectReason) -> u64 {
        self.rejections.get(&reason).copied().unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}
