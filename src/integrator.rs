use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::{ms_to_kmh, LocationSample};

/// Read-only view of the integrator for snapshots
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegratorState {
    pub distance_m: f64,
    pub current_speed_kmh: f64,
    pub rolling_speed_kmh: f64,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub moving_secs: f64,
}

/// Speed between two accepted fixes in km/h.
///
/// Uses the device-reported speed of `current` when present, otherwise the
/// great-circle distance over elapsed time.
pub fn pair_speed_kmh(previous: &LocationSample, current: &LocationSample) -> f64 {
    if let Some(reported) = current.reported_speed() {
        return ms_to_kmh(reported);
    }
    let dt = current.timestamp - previous.timestamp;
    if dt <= 0.0 {
        return 0.0;
    }
    ms_to_kmh(previous.distance_to(current) / dt)
}

/// Accumulates distance and speed statistics from consecutive accepted fixes
pub struct DistanceIntegrator {
    anchor: Option<LocationSample>,
    distance_m: f64,
    moving_secs: f64,
    speeds: VecDeque<f64>,
    speed_window: usize,
    /// Pair speeds below this count as standing still
    moving_speed_kmh: f64,
    current_speed_kmh: f64,
    max_speed_kmh: f64,
}

impl DistanceIntegrator {
    pub fn new(speed_window: usize, moving_speed_kmh: f64) -> Self {
        let speed_window = speed_window.max(1);
        Self {
            anchor: None,
            distance_m: 0.0,
            moving_secs: 0.0,
            speeds: VecDeque::with_capacity(speed_window),
            speed_window,
            moving_speed_kmh,
            current_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
        }
    }

    /// Fold one accepted sample in, returning the distance it added (meters)
    pub fn add(&mut self, sample: &LocationSample) -> f64 {
        let previous = match self.anchor.replace(sample.clone()) {
            Some(previous) => previous,
            None => {
                // First fix of a leg: nothing to integrate yet
                if let Some(reported) = sample.reported_speed() {
                    self.push_speed(ms_to_kmh(reported));
                }
                return 0.0;
            }
        };

        let dt = sample.timestamp - previous.timestamp;
        if dt <= 0.0 {
            return 0.0;
        }

        let delta = previous.distance_to(sample);
        let speed_kmh = pair_speed_kmh(&previous, sample);
        self.distance_m += delta;
        if speed_kmh >= self.moving_speed_kmh {
            self.moving_secs += dt;
        }
        self.push_speed(speed_kmh);
        delta
    }

    fn push_speed(&mut self, speed_kmh: f64) {
        self.speeds.push_back(speed_kmh);
        while self.speeds.len() > self.speed_window {
            self.speeds.pop_front();
        }
        self.current_speed_kmh = speed_kmh;
        if speed_kmh > self.max_speed_kmh {
            self.max_speed_kmh = speed_kmh;
        }
    }

    /// Forget the last fix so the next one starts a new leg (used on pause)
    pub fn release_anchor(&mut self) {
        self.anchor = None;
        self.current_speed_kmh = 0.0;
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn max_speed_kmh(&self) -> f64 {
        self.max_speed_kmh
    }

    pub fn moving_secs(&self) -> f64 {
        self.moving_secs
    }

    pub fn current_speed_kmh(&self) -> f64 {
        self.current_speed_kmh
    }

    /// Mean of the last `speed_window` pair speeds
    pub fn rolling_speed_kmh(&self) -> f64 {
        if self.speeds.is_empty() {
            return 0.0;
        }
        self.speeds.iter().sum::<f64>() / self.speeds.len() as f64
    }

    /// Distance over moving time for the whole ride
    pub fn average_speed_kmh(&self) -> f64 {
        if self.moving_secs <= 0.0 {
            return 0.0;
        }
        ms_to_kmh(self.distance_m / self.moving_secs)
    }

    pub fn state(&self) -> IntegratorState {
        IntegratorState {
            distance_m: self.distance_m,
            current_speed_kmh: self.current_speed_kmh,
            rolling_speed_kmh: self.rolling_speed_kmh(),
            average_speed_kmh: self.average_speed_kmh(),
            max_speed_kmh: self.max_speed_kmh,
            moving_secs: self.moving_secs,
        }
    }
}
