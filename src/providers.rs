//! Seams to the platform: time source, location provider policy and the
//! user confirmation prompt. The engine and session only see these traits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::recording::{RideSnapshot, SamplingPrecision};

/// Processing-time source in seconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        current_timestamp()
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Settable clock for replays and tests; clones share the same time
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, now: f64) {
        self.bits.store(now.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.set(self.now() + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Receives the sampling policy the engine wants
pub trait LocationProvider: Send {
    fn set_precision(&mut self, precision: SamplingPrecision);
}

/// Asks the user whether a detected drive should be recorded
pub trait ConfirmationPrompt: Send {
    fn request_start_confirmation(&mut self, snapshot: &RideSnapshot);
}
