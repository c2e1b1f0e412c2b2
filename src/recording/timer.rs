use serde::{Deserialize, Serialize};

/// The three engine timers; at most one of each kind is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    StartCountdown,
    PauseDetection,
    EndDetection,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [
        TimerKind::StartCountdown,
        TimerKind::PauseDetection,
        TimerKind::EndDetection,
    ];

    fn index(&self) -> usize {
        match self {
            TimerKind::StartCountdown => 0,
            TimerKind::PauseDetection => 1,
            TimerKind::EndDetection => 2,
        }
    }
}

/// Handed to the scheduler and echoed back when the timer fires
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub epoch: u64,
    /// Timestamp the timer is due at; used as the transition time
    pub due_at: f64,
}

/// Per-kind generation counters.
///
/// Every schedule or cancel advances the generation of that kind, so a token
/// from an earlier generation no longer matches and firing it is a no-op.
#[derive(Debug, Default)]
pub struct TimerBook {
    generations: [u64; 3],
    pending: [Option<TimerToken>; 3],
}

impl TimerBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any pending timer of this kind
    pub fn schedule(&mut self, kind: TimerKind, due_at: f64) -> TimerToken {
        let idx = kind.index();
        self.generations[idx] += 1;
        let token = TimerToken {
            kind,
            epoch: self.generations[idx],
            due_at,
        };
        self.pending[idx] = Some(token);
        token
    }

    /// Returns true if a timer of this kind was pending
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        let idx = kind.index();
        self.generations[idx] += 1;
        self.pending[idx].take().is_some()
    }

    /// Consume a fired token; false when it belongs to a superseded generation
    pub fn fire(&mut self, token: &TimerToken) -> bool {
        let idx = token.kind.index();
        match self.pending[idx] {
            Some(pending) if pending.epoch == token.epoch => {
                self.pending[idx] = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending[kind.index()].is_some()
    }

    pub fn pending(&self, kind: TimerKind) -> Option<TimerToken> {
        self.pending[kind.index()]
    }
}
