use std::collections::VecDeque;

use crate::types::MotionEvent;

/// Majority-vote debouncer for the platform activity classifier
///
/// Each event contributes one "automotive-likely" vote; the smoothed flag is
/// true only while a strict majority of the window capacity votes yes, so a
/// single noisy classification cannot flip the state.
pub struct MotionSmoother {
    window: VecDeque<bool>,
    window_size: usize,
    last_event_time: Option<f64>,
}

impl MotionSmoother {
    /// Create a new smoother with given window size (typically 5)
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        MotionSmoother {
            window: VecDeque::with_capacity(window_size),
            window_size,
            last_event_time: None,
        }
    }

    /// Push one classification and return the smoothed flag
    pub fn ingest(&mut self, event: &MotionEvent) -> bool {
        self.window.push_back(event.is_automotive_likely());
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }
        self.last_event_time = Some(event.timestamp);
        self.is_automotive()
    }

    pub fn is_automotive(&self) -> bool {
        self.votes() * 2 > self.window_size
    }

    pub fn votes(&self) -> usize {
        self.window.iter().filter(|v| **v).count()
    }

    pub fn last_event_time(&self) -> Option<f64> {
        self.last_event_time
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.last_event_time = None;
    }
}
