//! Deterministic replay of recorded event logs.
//!
//! Processing time is driven by a `ManualClock`; pending timers are fired in
//! due order before each log entry, so a replay reproduces exactly what the
//! live session would have done.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::config::RecordingConfig;
use crate::error::{RResult, RideTrackerError};
use crate::providers::{Clock, ManualClock};
use crate::reconciliation::DistanceComparison;
use crate::recording::{
    Command, Effect, EngineEvent, RecordingEngine, RecordingState, SamplingPrecision, TimerKind, TimerToken,
};

/// One logged input. `at` is the processing time; when absent the event's own
/// timestamp is used (commands keep the current time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayEntry {
    #[serde(default)]
    pub at: Option<f64>,
    pub event: EngineEvent,
}

impl ReplayEntry {
    fn processing_time(&self) -> Option<f64> {
        self.at.or(match &self.event {
            EngineEvent::Location(sample) => Some(sample.timestamp),
            EngineEvent::Motion(event) => Some(event.timestamp),
            EngineEvent::Command(_) | EngineEvent::TimerFired(_) => None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    #[serde(default)]
    pub start_odometer: f64,
    pub entries: Vec<ReplayEntry>,
}

/// Load an event log, transparently gunzipping `*.gz` files
pub fn load_event_log(path: &Path) -> RResult<EventLog> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let reader = BufReader::new(GzDecoder::new(file));
        Ok(serde_json::from_reader(reader)?)
    } else {
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// What the replay observed besides the engine's own state
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    pub entries: usize,
    pub timers_fired: usize,
    pub confirmation_requests: usize,
    pub precision_changes: Vec<(f64, SamplingPrecision)>,
    pub rejected_commands: Vec<String>,
    pub reconciliation: Option<DistanceComparison>,
}

pub struct Replayer {
    clock: ManualClock,
    engine: RecordingEngine,
    timers: Vec<TimerToken>,
    auto_confirm: bool,
    report: ReplayReport,
}

impl Replayer {
    pub fn new(config: RecordingConfig, start_odometer: f64, start_time: f64) -> RResult<Self> {
        let clock = ManualClock::new(start_time);
        let engine = RecordingEngine::new(config, start_odometer, Arc::new(clock.clone()))?;
        Ok(Self {
            clock,
            engine,
            timers: Vec::new(),
            auto_confirm: false,
            report: ReplayReport::default(),
        })
    }

    /// Build a replayer whose clock starts at the first timed entry
    pub fn for_log(config: RecordingConfig, log: &EventLog) -> RResult<Self> {
        let start = log
            .entries
            .iter()
            .find_map(ReplayEntry::processing_time)
            .unwrap_or(0.0);
        Self::new(config, log.start_odometer, start)
    }

    /// Answer every start prompt with `ConfirmAutoStart`
    pub fn auto_confirm(mut self, enabled: bool) -> Self {
        self.auto_confirm = enabled;
        self
    }

    pub fn run(&mut self, log: &EventLog) -> RResult<()> {
        for entry in &log.entries {
            self.feed(entry)?;
        }
        Ok(())
    }

    pub fn feed(&mut self, entry: &ReplayEntry) -> RResult<()> {
        let at = entry.processing_time().unwrap_or_else(|| self.clock.now());
        self.advance_to(at)?;
        self.report.entries += 1;

        match &entry.event {
            EngineEvent::Command(command) => self.command(command.clone()),
            event => {
                let effects = self.engine.handle(event.clone())?;
                self.apply(effects)
            }
        }
    }

    /// Fire every timer due at or before `t`, then move the clock to `t`
    pub fn advance_to(&mut self, t: f64) -> RResult<()> {
        while let Some(token) = self.next_due(t) {
            self.clock.set(token.due_at.max(self.clock.now()));
            self.report.timers_fired += 1;
            let effects = self.engine.handle(EngineEvent::TimerFired(token))?;
            self.apply(effects)?;
        }
        if t > self.clock.now() {
            self.clock.set(t);
        }
        Ok(())
    }

    /// Fire every outstanding timer, e.g. to let a trailing pause run into auto-end
    pub fn drain_timers(&mut self) -> RResult<()> {
        while let Some(due) = self.timers.iter().map(|t| t.due_at).reduce(f64::min) {
            self.advance_to(due)?;
        }
        Ok(())
    }

    /// Apply a command; engine rejections are recorded, not fatal
    pub fn command(&mut self, command: Command) -> RResult<()> {
        match self.engine.handle(EngineEvent::Command(command.clone())) {
            Ok(effects) => self.apply(effects),
            Err(e @ RideTrackerError::InvalidTransition { .. })
            | Err(e @ RideTrackerError::NotAwaitingConfirmation)
            | Err(e @ RideTrackerError::NoPendingReconciliation) => {
                log::warn!("replay: {:?} rejected: {}", command, e);
                self.report.rejected_commands.push(format!("{:?}: {}", command, e));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn next_due(&mut self, t: f64) -> Option<TimerToken> {
        let (idx, _) = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, token)| token.due_at <= t)
            .min_by(|a, b| a.1.due_at.total_cmp(&b.1.due_at))?;
        Some(self.timers.remove(idx))
    }

    fn forget(&mut self, kind: TimerKind) {
        self.timers.retain(|t| t.kind != kind);
    }

    fn apply(&mut self, effects: Vec<Effect>) -> RResult<()> {
        let mut confirm = false;
        for effect in effects {
            match effect {
                Effect::ScheduleTimer { token, .. } => {
                    self.forget(token.kind);
                    self.timers.push(token);
                }
                Effect::CancelTimer { kind } => self.forget(kind),
                Effect::RequestStartConfirmation => {
                    self.report.confirmation_requests += 1;
                    confirm = self.auto_confirm;
                }
                Effect::SetSamplingPrecision { precision } => {
                    self.report.precision_changes.push((self.clock.now(), precision));
                }
                Effect::ReconciliationRequired { comparison } => {
                    self.report.reconciliation = Some(comparison);
                }
                Effect::StateChanged { .. } => {}
            }
        }
        if confirm {
            self.command(Command::ConfirmAutoStart)?;
        }
        Ok(())
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn state(&self) -> RecordingState {
        self.engine.state()
    }

    pub fn engine(&self) -> &RecordingEngine {
        &self.engine
    }

    pub fn report(&self) -> &ReplayReport {
        &self.report
    }

    pub fn into_parts(self) -> (RecordingEngine, ReplayReport) {
        (self.engine, self.report)
    }
}
