use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ride::{AuditAction, AuditEntry, Ride};
use super::snapshot::RideSnapshot;
use super::state::{RecordingMode, RecordingState, SamplingPrecision};
use super::timer::{TimerBook, TimerKind, TimerToken};
use crate::config::RecordingConfig;
use crate::error::{RResult, RideTrackerError};
use crate::filters::{LocationFilter, MotionSmoother};
use crate::integrator::{pair_speed_kmh, DistanceIntegrator};
use crate::providers::Clock;
use crate::reconciliation::{DistanceComparison, OdometerReconciler, ReconciliationOutcome, Resolution};
use crate::types::{ms_to_kmh, LocationSample, MotionEvent};

/// Explicit user commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Start,
    Pause,
    Resume,
    End,
    ConfirmAutoStart,
    CancelAutoStart,
    SetMode {
        mode: RecordingMode,
    },
    SubmitEndOdometer {
        value: f64,
    },
    ResolveReconciliation {
        resolution: Resolution,
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Everything the engine reacts to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    Location(LocationSample),
    Motion(MotionEvent),
    Command(Command),
    TimerFired(TimerToken),
}

/// Requests for the owner of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    StateChanged {
        from: RecordingState,
        to: RecordingState,
        automatic: bool,
    },
    /// Deliver `TimerFired(token)` after `delay_secs`
    ScheduleTimer { token: TimerToken, delay_secs: f64 },
    CancelTimer { kind: TimerKind },
    /// Auto-start countdown elapsed; ask the user before recording
    RequestStartConfirmation,
    SetSamplingPrecision { precision: SamplingPrecision },
    ReconciliationRequired { comparison: DistanceComparison },
}

struct PendingReconciliation {
    submitted_end: f64,
    comparison: DistanceComparison,
}

/// Ride lifecycle state machine.
///
/// Owns the location filter, motion smoother and distance integrator for one
/// ride. Every input goes through [`RecordingEngine::handle`], which mutates
/// state synchronously and returns the effects the caller must carry out
/// (timers, provider policy, prompts). Timers are identified by generation
/// tokens, so a late `TimerFired` for a cancelled or replaced timer is ignored.
pub struct RecordingEngine {
    config: RecordingConfig,
    clock: Arc<dyn Clock>,
    state: RecordingState,
    mode: RecordingMode,
    precision: SamplingPrecision,
    filter: LocationFilter,
    smoother: MotionSmoother,
    integrator: DistanceIntegrator,
    timers: TimerBook,
    reconciler: OdometerReconciler,
    start_odometer: f64,
    ride: Option<Ride>,
    live_speed_kmh: f64,
    awaiting_confirmation: bool,
    // Cleared when the user declines an auto-start, re-set once the vehicle slows down
    auto_start_armed: bool,
    paused_automatically: bool,
    pending_reconciliation: Option<PendingReconciliation>,
}

impl RecordingEngine {
    pub fn new(config: RecordingConfig, start_odometer: f64, clock: Arc<dyn Clock>) -> RResult<Self> {
        config.validate()?;
        if !start_odometer.is_finite() || start_odometer < 0.0 {
            return Err(RideTrackerError::InvalidOdometer(format!(
                "start odometer {} must be a non-negative number",
                start_odometer
            )));
        }

        let mode = if config.automatic {
            RecordingMode::Automatic
        } else {
            RecordingMode::Manual
        };

        Ok(Self {
            filter: LocationFilter::new(config.filter.clone()),
            smoother: MotionSmoother::new(config.motion_window),
            integrator: DistanceIntegrator::new(config.speed_window, config.pause_speed_kmh),
            reconciler: OdometerReconciler::new(config.reconciliation_tolerance),
            timers: TimerBook::new(),
            state: RecordingState::NotStarted,
            mode,
            precision: SamplingPrecision::High,
            start_odometer,
            ride: None,
            live_speed_kmh: 0.0,
            awaiting_confirmation: false,
            auto_start_armed: true,
            paused_automatically: false,
            pending_reconciliation: None,
            config,
            clock,
        })
    }

    pub fn handle(&mut self, event: EngineEvent) -> RResult<Vec<Effect>> {
        let mut effects = Vec::new();
        match event {
            EngineEvent::Location(sample) => self.on_location(sample, &mut effects),
            EngineEvent::Motion(event) => self.on_motion(&event, &mut effects),
            EngineEvent::Command(command) => self.on_command(command, &mut effects)?,
            EngineEvent::TimerFired(token) => self.on_timer(token, &mut effects),
        }
        Ok(effects)
    }

    fn on_location(&mut self, sample: LocationSample, effects: &mut Vec<Effect>) {
        let previous = self.filter.last_accepted().cloned();
        if !self.filter.accept(&sample, self.clock.now()) {
            return;
        }

        self.live_speed_kmh = match &previous {
            Some(previous) => pair_speed_kmh(previous, &sample),
            None => sample.reported_speed().map(ms_to_kmh).unwrap_or(0.0),
        };

        match self.state {
            RecordingState::NotStarted => self.evaluate_auto_start(sample.timestamp, effects),
            RecordingState::Recording => {
                self.integrate(&sample);
                self.evaluate_auto_pause(sample.timestamp, effects);
            }
            RecordingState::Paused => {
                if self.evaluate_auto_resume(sample.timestamp, effects) {
                    // First fix of the new leg
                    self.integrate(&sample);
                }
            }
            RecordingState::Ended => {}
        }
    }

    fn on_motion(&mut self, event: &MotionEvent, effects: &mut Vec<Effect>) {
        self.smoother.ingest(event);
        match self.state {
            RecordingState::NotStarted => self.evaluate_auto_start(event.timestamp, effects),
            RecordingState::Paused => {
                self.evaluate_auto_resume(event.timestamp, effects);
            }
            _ => {}
        }
    }

    fn on_timer(&mut self, token: TimerToken, effects: &mut Vec<Effect>) {
        if !self.timers.fire(&token) {
            log::debug!(
                "ignoring stale {:?} timer (epoch {}) in {:?}",
                token.kind,
                token.epoch,
                self.state
            );
            return;
        }
        if self.mode != RecordingMode::Automatic {
            return;
        }

        match (token.kind, self.state) {
            (TimerKind::StartCountdown, RecordingState::NotStarted) => {
                log::info!(
                    "vehicle motion sustained for {}s, requesting start confirmation",
                    self.config.start_countdown_secs
                );
                self.awaiting_confirmation = true;
                effects.push(Effect::RequestStartConfirmation);
            }
            (TimerKind::PauseDetection, RecordingState::Recording) => {
                let reason = format!(
                    "speed below {} km/h for {}s",
                    self.config.pause_speed_kmh, self.config.pause_after_secs
                );
                self.pause(token.due_at, true, Some(reason), effects);
            }
            (TimerKind::EndDetection, RecordingState::Paused) => {
                let reason = format!("no vehicle motion for {}s", self.config.end_after_secs);
                self.end(token.due_at, true, Some(reason), effects);
            }
            (kind, state) => {
                log::debug!("{:?} timer fired in {:?}, nothing to do", kind, state);
            }
        }
    }

    fn on_command(&mut self, command: Command, effects: &mut Vec<Effect>) -> RResult<()> {
        let now = self.clock.now();
        match command {
            Command::Start => {
                self.require(RecordingState::NotStarted, "start")?;
                self.start(now, false, None, effects);
            }
            Command::ConfirmAutoStart => {
                if self.state != RecordingState::NotStarted || !self.awaiting_confirmation {
                    return Err(RideTrackerError::NotAwaitingConfirmation);
                }
                let reason = format!(
                    "vehicle motion above {} km/h for {}s",
                    self.config.start_speed_kmh, self.config.start_countdown_secs
                );
                self.start(now, true, Some(reason), effects);
            }
            Command::CancelAutoStart => {
                if !self.awaiting_confirmation {
                    return Err(RideTrackerError::NotAwaitingConfirmation);
                }
                log::info!("auto-start declined");
                self.awaiting_confirmation = false;
                self.auto_start_armed = false;
            }
            Command::Pause => {
                self.require(RecordingState::Recording, "pause")?;
                self.pause(now, false, None, effects);
            }
            Command::Resume => {
                self.require(RecordingState::Paused, "resume")?;
                self.resume(now, false, None, effects);
            }
            Command::End => {
                if !self.state.is_active() {
                    return Err(RideTrackerError::InvalidTransition {
                        action: "end",
                        state: self.state,
                    });
                }
                self.end(now, false, None, effects);
            }
            Command::SetMode { mode } => self.set_mode(mode, now, effects),
            Command::SubmitEndOdometer { value } => self.submit_end_odometer(value, now, effects)?,
            Command::ResolveReconciliation { resolution, reason } => {
                self.resolve_reconciliation(resolution, reason, now)?
            }
        }
        Ok(())
    }

    fn require(&self, expected: RecordingState, action: &'static str) -> RResult<()> {
        if self.state != expected {
            return Err(RideTrackerError::InvalidTransition {
                action,
                state: self.state,
            });
        }
        Ok(())
    }

    // ===== Automatic rules =====

    fn evaluate_auto_start(&mut self, at: f64, effects: &mut Vec<Effect>) {
        if self.mode != RecordingMode::Automatic || self.awaiting_confirmation {
            return;
        }

        if self.live_speed_kmh < self.config.start_speed_kmh {
            self.auto_start_armed = true;
            if self.cancel_timer(TimerKind::StartCountdown, effects) {
                log::debug!("speed dropped to {:.1} km/h, start countdown cancelled", self.live_speed_kmh);
            }
            return;
        }

        if self.auto_start_armed
            && self.smoother.is_automotive()
            && !self.timers.is_pending(TimerKind::StartCountdown)
        {
            log::debug!("vehicle motion detected at {:.1} km/h, start countdown armed", self.live_speed_kmh);
            self.schedule_timer(TimerKind::StartCountdown, at + self.config.start_countdown_secs, effects);
        }
    }

    fn evaluate_auto_pause(&mut self, at: f64, effects: &mut Vec<Effect>) {
        if self.mode != RecordingMode::Automatic {
            return;
        }
        if self.live_speed_kmh < self.config.pause_speed_kmh {
            if !self.timers.is_pending(TimerKind::PauseDetection) {
                self.schedule_timer(TimerKind::PauseDetection, at + self.config.pause_after_secs, effects);
            }
        } else {
            self.cancel_timer(TimerKind::PauseDetection, effects);
        }
    }

    fn evaluate_auto_resume(&mut self, at: f64, effects: &mut Vec<Effect>) -> bool {
        if self.mode != RecordingMode::Automatic {
            return false;
        }
        if !self.smoother.is_automotive() || self.live_speed_kmh < self.config.start_speed_kmh {
            return false;
        }
        if !self.paused_automatically {
            // A user pause only ends by command, but driving restarts the end window
            self.schedule_timer(TimerKind::EndDetection, at + self.config.end_after_secs, effects);
            return false;
        }
        let reason = format!("vehicle motion resumed at {:.0} km/h", self.live_speed_kmh);
        self.resume(at, true, Some(reason), effects);
        true
    }

    // ===== Transitions =====

    fn start(&mut self, at: f64, automatic: bool, reason: Option<String>, effects: &mut Vec<Effect>) {
        self.cancel_timer(TimerKind::StartCountdown, effects);
        self.awaiting_confirmation = false;
        self.integrator = DistanceIntegrator::new(self.config.speed_window, self.config.pause_speed_kmh);
        self.ride = Some(Ride::new(at, self.start_odometer));
        self.transition(AuditAction::Start, RecordingState::Recording, at, automatic, reason, effects);
        self.set_precision(SamplingPrecision::High, effects);
    }

    fn pause(&mut self, at: f64, automatic: bool, reason: Option<String>, effects: &mut Vec<Effect>) {
        self.cancel_timer(TimerKind::PauseDetection, effects);
        self.integrator.release_anchor();
        self.paused_automatically = automatic;
        self.transition(AuditAction::Pause, RecordingState::Paused, at, automatic, reason, effects);
        self.set_precision(SamplingPrecision::Reduced, effects);
        if self.mode == RecordingMode::Automatic {
            self.schedule_timer(TimerKind::EndDetection, at + self.config.end_after_secs, effects);
        }
    }

    fn resume(&mut self, at: f64, automatic: bool, reason: Option<String>, effects: &mut Vec<Effect>) {
        self.cancel_timer(TimerKind::EndDetection, effects);
        self.paused_automatically = false;
        self.transition(AuditAction::Resume, RecordingState::Recording, at, automatic, reason, effects);
        self.set_precision(SamplingPrecision::High, effects);
    }

    fn end(&mut self, at: f64, automatic: bool, reason: Option<String>, effects: &mut Vec<Effect>) {
        for kind in TimerKind::ALL {
            self.cancel_timer(kind, effects);
        }
        self.paused_automatically = false;
        if let Some(ride) = self.ride.as_mut() {
            ride.end_time = Some(at.max(ride.start_time));
        }
        self.transition(AuditAction::End, RecordingState::Ended, at, automatic, reason, effects);
    }

    fn transition(
        &mut self,
        action: AuditAction,
        to: RecordingState,
        at: f64,
        automatic: bool,
        reason: Option<String>,
        effects: &mut Vec<Effect>,
    ) {
        let from = self.state;
        self.state = to;
        log::info!(
            "ride {:?} -> {:?} ({}){}",
            from,
            to,
            if automatic { "automatic" } else { "user" },
            reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default()
        );
        if let Some(ride) = self.ride.as_mut() {
            ride.record(AuditEntry {
                timestamp: at,
                action,
                automatic,
                reason,
            });
        }
        effects.push(Effect::StateChanged { from, to, automatic });
    }

    fn set_mode(&mut self, mode: RecordingMode, now: f64, effects: &mut Vec<Effect>) {
        if self.mode == mode {
            return;
        }
        log::info!("recording mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        match mode {
            RecordingMode::Manual => {
                for kind in TimerKind::ALL {
                    self.cancel_timer(kind, effects);
                }
                self.awaiting_confirmation = false;
            }
            RecordingMode::Automatic => {
                if self.state == RecordingState::Paused {
                    self.schedule_timer(TimerKind::EndDetection, now + self.config.end_after_secs, effects);
                }
            }
        }
    }

    fn integrate(&mut self, sample: &LocationSample) {
        let ride = match self.ride.as_mut() {
            Some(ride) => ride,
            None => return,
        };
        if sample.timestamp < ride.start_time || !ride.push_route(sample.clone()) {
            return;
        }
        self.integrator.add(sample);
        ride.gps_distance_m = self.integrator.distance_m();
        ride.max_speed_kmh = self.integrator.max_speed_kmh();
        ride.average_speed_kmh = self.integrator.average_speed_kmh();
        ride.moving_secs = self.integrator.moving_secs();
    }

    // ===== Odometer =====

    fn submit_end_odometer(&mut self, value: f64, now: f64, effects: &mut Vec<Effect>) -> RResult<()> {
        let invalid = RideTrackerError::InvalidTransition {
            action: "submit end odometer",
            state: self.state,
        };
        if self.state != RecordingState::Ended {
            return Err(invalid);
        }
        let ride = self.ride.as_mut().ok_or(invalid)?;
        if ride.end_odometer.is_some() {
            return Err(RideTrackerError::InvalidTransition {
                action: "submit end odometer twice",
                state: RecordingState::Ended,
            });
        }

        let gps_distance = self.config.odometer_unit.from_meters(ride.gps_distance_m);
        match self.reconciler.reconcile(ride.start_odometer, value, gps_distance)? {
            ReconciliationOutcome::Accepted(c) => {
                ride.end_odometer = Some(value);
                ride.record(AuditEntry {
                    timestamp: now,
                    action: AuditAction::OdometerSubmitted,
                    automatic: false,
                    reason: Some(format!(
                        "odometer {:.1} vs GPS {:.1} ({:.1}% apart)",
                        c.odometer_distance, c.gps_distance, c.discrepancy_pct
                    )),
                });
                self.pending_reconciliation = None;
            }
            ReconciliationOutcome::NeedsReconciliation(c) => {
                log::warn!(
                    "ride {}: odometer distance {:.1} and GPS distance {:.1} differ by {:.1}%",
                    ride.ride_id,
                    c.odometer_distance,
                    c.gps_distance,
                    c.discrepancy_pct
                );
                self.pending_reconciliation = Some(PendingReconciliation {
                    submitted_end: value,
                    comparison: c,
                });
                effects.push(Effect::ReconciliationRequired { comparison: c });
            }
        }
        Ok(())
    }

    fn resolve_reconciliation(&mut self, resolution: Resolution, reason: Option<String>, now: f64) -> RResult<()> {
        if self.ride.is_none() {
            return Err(RideTrackerError::NoPendingReconciliation);
        }
        let pending = self
            .pending_reconciliation
            .take()
            .ok_or(RideTrackerError::NoPendingReconciliation)?;
        let ride = self.ride.as_mut().ok_or(RideTrackerError::NoPendingReconciliation)?;
        let c = pending.comparison;

        let (end_odometer, summary) = match resolution {
            Resolution::KeepOdometer => (
                pending.submitted_end,
                format!(
                    "kept odometer distance {:.1} over GPS {:.1} ({:.1}% apart)",
                    c.odometer_distance, c.gps_distance, c.discrepancy_pct
                ),
            ),
            Resolution::UseGps => (
                ride.start_odometer + c.gps_distance,
                format!(
                    "replaced odometer distance {:.1} with GPS {:.1} ({:.1}% apart)",
                    c.odometer_distance, c.gps_distance, c.discrepancy_pct
                ),
            ),
        };
        ride.end_odometer = Some(end_odometer);

        let reason = match reason.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => format!("{}: {}", summary, text),
            _ => summary,
        };
        log::info!("ride {} reconciled: {}", ride.ride_id, reason);
        ride.record(AuditEntry {
            timestamp: now,
            action: AuditAction::Reconciled,
            automatic: false,
            reason: Some(reason),
        });
        Ok(())
    }

    // ===== Timers and policy =====

    fn schedule_timer(&mut self, kind: TimerKind, due_at: f64, effects: &mut Vec<Effect>) {
        let token = self.timers.schedule(kind, due_at);
        let delay_secs = (due_at - self.clock.now()).max(0.0);
        effects.push(Effect::ScheduleTimer { token, delay_secs });
    }

    fn cancel_timer(&mut self, kind: TimerKind, effects: &mut Vec<Effect>) -> bool {
        let was_pending = self.timers.cancel(kind);
        if was_pending {
            effects.push(Effect::CancelTimer { kind });
        }
        was_pending
    }

    fn set_precision(&mut self, precision: SamplingPrecision, effects: &mut Vec<Effect>) {
        if self.precision != precision {
            self.precision = precision;
            effects.push(Effect::SetSamplingPrecision { precision });
        }
    }

    // ===== Read side =====

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn mode(&self) -> RecordingMode {
        self.mode
    }

    pub fn precision(&self) -> SamplingPrecision {
        self.precision
    }

    pub fn ride(&self) -> Option<&Ride> {
        self.ride.as_ref()
    }

    pub fn into_ride(self) -> Option<Ride> {
        self.ride
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        self.ride.as_ref().map(|r| r.audit_log()).unwrap_or(&[])
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.awaiting_confirmation
    }

    pub fn pending_timer(&self, kind: TimerKind) -> Option<TimerToken> {
        self.timers.pending(kind)
    }

    pub fn pending_reconciliation(&self) -> Option<DistanceComparison> {
        self.pending_reconciliation.as_ref().map(|p| p.comparison)
    }

    pub fn filter(&self) -> &LocationFilter {
        &self.filter
    }

    pub fn live_speed_kmh(&self) -> f64 {
        self.live_speed_kmh
    }

    pub fn snapshot(&self) -> RideSnapshot {
        let now = self.clock.now();
        let stats = self.integrator.state();
        let (ride_id, elapsed_secs, route) = match &self.ride {
            Some(ride) => (
                Some(ride.ride_id.clone()),
                (ride.end_time.unwrap_or(now) - ride.start_time).max(0.0),
                ride.route.clone(),
            ),
            None => (None, 0.0, Vec::new()),
        };

        RideSnapshot {
            timestamp: now,
            state: self.state,
            mode: self.mode,
            precision: self.precision,
            ride_id,
            elapsed_secs,
            moving_secs: stats.moving_secs,
            distance_m: stats.distance_m,
            current_speed_kmh: self.live_speed_kmh,
            rolling_speed_kmh: stats.rolling_speed_kmh,
            average_speed_kmh: stats.average_speed_kmh,
            max_speed_kmh: stats.max_speed_kmh,
            automotive_likely: self.smoother.is_automotive(),
            awaiting_start_confirmation: self.awaiting_confirmation,
            pending_reconciliation: self.pending_reconciliation(),
            route,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ManualClock;
    use crate::types::{ActivityType, Confidence};

    const T0: f64 = 1_763_542_800.0;
    // ~11.1 m north per step
    const STEP_DEG: f64 = 0.0001;

    struct Rig {
        clock: ManualClock,
        engine: RecordingEngine,
    }

    impl Rig {
        fn new(config: RecordingConfig) -> Self {
            let clock = ManualClock::new(T0);
            let engine = RecordingEngine::new(config, 15_000.0, Arc::new(clock.clone())).unwrap();
            Rig { clock, engine }
        }

        fn auto() -> Self {
            Self::new(RecordingConfig::default())
        }

        fn location(&mut self, t: f64, lat: f64, speed_ms: f64) -> Vec<Effect> {
            self.clock.set(t);
            let sample = LocationSample::new(t, lat, -120.0, 5.0).with_speed(speed_ms);
            self.engine.handle(EngineEvent::Location(sample)).unwrap()
        }

        fn motion(&mut self, t: f64, activity: ActivityType) -> Vec<Effect> {
            self.clock.set(t);
            let event = MotionEvent::new(t, activity, Confidence::High);
            self.engine.handle(EngineEvent::Motion(event)).unwrap()
        }

        fn command(&mut self, command: Command) -> RResult<Vec<Effect>> {
            self.engine.handle(EngineEvent::Command(command))
        }

        fn fire(&mut self, kind: TimerKind) -> Vec<Effect> {
            let token = self.engine.pending_timer(kind).expect("timer not pending");
            self.clock.set(token.due_at);
            self.engine.handle(EngineEvent::TimerFired(token)).unwrap()
        }

        /// Motion votes automotive and a fast fix arrives
        fn detect_drive(&mut self, t: f64) -> Vec<Effect> {
            for i in 0..3 {
                self.motion(t + i as f64 * 0.1, ActivityType::Automotive);
            }
            self.location(t + 1.0, 40.0, 15.0)
        }
    }

    fn scheduled(effects: &[Effect], kind: TimerKind) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, Effect::ScheduleTimer { token, .. } if token.kind == kind))
    }

    fn cancelled(effects: &[Effect], kind: TimerKind) -> bool {
        effects.contains(&Effect::CancelTimer { kind })
    }

    #[test]
    fn test_drive_arms_start_countdown() {
        let mut rig = Rig::auto();
        let effects = rig.detect_drive(T0);
        assert!(scheduled(&effects, TimerKind::StartCountdown));
        let token = rig.engine.pending_timer(TimerKind::StartCountdown).unwrap();
        assert_eq!(token.due_at, T0 + 1.0 + 20.0);
        assert_eq!(rig.engine.state(), RecordingState::NotStarted);
    }

    #[test]
    fn test_countdown_needs_confirmation() {
        let mut rig = Rig::auto();
        rig.detect_drive(T0);
        let effects = rig.fire(TimerKind::StartCountdown);
        assert_eq!(effects, vec![Effect::RequestStartConfirmation]);
        assert_eq!(rig.engine.state(), RecordingState::NotStarted);
        assert!(rig.engine.is_awaiting_confirmation());

        rig.command(Command::ConfirmAutoStart).unwrap();
        assert_eq!(rig.engine.state(), RecordingState::Recording);
        let log = rig.engine.audit_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, AuditAction::Start);
        assert!(log[0].automatic);
        assert!(log[0].reason.is_some());
    }

    #[test]
    fn test_slowing_down_cancels_countdown() {
        let mut rig = Rig::auto();
        rig.detect_drive(T0);
        let effects = rig.location(T0 + 5.0, 40.0 + STEP_DEG, 1.0);
        assert!(cancelled(&effects, TimerKind::StartCountdown));
        assert!(rig.engine.pending_timer(TimerKind::StartCountdown).is_none());
    }

    #[test]
    fn test_manual_start_bypasses_countdown() {
        let mut rig = Rig::auto();
        rig.detect_drive(T0);
        let stale = rig.engine.pending_timer(TimerKind::StartCountdown).unwrap();

        let effects = rig.command(Command::Start).unwrap();
        assert!(cancelled(&effects, TimerKind::StartCountdown));
        assert_eq!(rig.engine.state(), RecordingState::Recording);

        // The superseded countdown must not prompt anymore
        let effects = rig.engine.handle(EngineEvent::TimerFired(stale)).unwrap();
        assert!(effects.is_empty());
        assert!(!rig.engine.is_awaiting_confirmation());
        assert_eq!(rig.engine.audit_log().len(), 1);
        assert!(!rig.engine.audit_log()[0].automatic);
    }

    #[test]
    fn test_declined_auto_start_waits_for_slowdown() {
        let mut rig = Rig::auto();
        rig.detect_drive(T0);
        rig.fire(TimerKind::StartCountdown);
        rig.command(Command::CancelAutoStart).unwrap();

        // Still driving: no new countdown
        let effects = rig.location(T0 + 30.0, 40.0 + 20.0 * STEP_DEG, 15.0);
        assert!(!scheduled(&effects, TimerKind::StartCountdown));

        // Stop, then drive again: detection re-arms
        rig.location(T0 + 40.0, 40.0 + 21.0 * STEP_DEG, 0.5);
        let effects = rig.location(T0 + 50.0, 40.0 + 30.0 * STEP_DEG, 15.0);
        assert!(scheduled(&effects, TimerKind::StartCountdown));
    }

    #[test]
    fn test_confirm_without_prompt_rejected() {
        let mut rig = Rig::auto();
        assert!(matches!(
            rig.command(Command::ConfirmAutoStart),
            Err(RideTrackerError::NotAwaitingConfirmation)
        ));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut rig = Rig::auto();
        let result = rig.command(Command::End);
        assert!(matches!(
            result,
            Err(RideTrackerError::InvalidTransition {
                state: RecordingState::NotStarted,
                ..
            })
        ));
        assert_eq!(rig.engine.state(), RecordingState::NotStarted);
        assert!(rig.engine.ride().is_none());
    }

    #[test]
    fn test_invalid_manual_transitions() {
        let mut rig = Rig::auto();
        assert!(rig.command(Command::Pause).is_err());
        assert!(rig.command(Command::Resume).is_err());
        rig.command(Command::Start).unwrap();
        assert!(rig.command(Command::Start).is_err());
        assert!(rig.command(Command::Resume).is_err());
        rig.command(Command::End).unwrap();
        assert!(rig.command(Command::End).is_err());
        assert!(rig.command(Command::Start).is_err());
    }

    #[test]
    fn test_auto_pause_after_sustained_slow_speed() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.location(T0 + 1.0, 40.0, 15.0);
        let effects = rig.location(T0 + 2.0, 40.0 + STEP_DEG, 0.2);
        assert!(scheduled(&effects, TimerKind::PauseDetection));

        // Still slow: the original deadline stands
        rig.location(T0 + 30.0, 40.0 + 2.0 * STEP_DEG, 0.2);
        let token = rig.engine.pending_timer(TimerKind::PauseDetection).unwrap();
        assert_eq!(token.due_at, T0 + 62.0);

        let effects = rig.fire(TimerKind::PauseDetection);
        assert_eq!(rig.engine.state(), RecordingState::Paused);
        assert!(effects.contains(&Effect::SetSamplingPrecision {
            precision: SamplingPrecision::Reduced
        }));
        assert!(scheduled(&effects, TimerKind::EndDetection));

        let entry = rig.engine.audit_log().last().unwrap();
        assert_eq!(entry.action, AuditAction::Pause);
        assert!(entry.automatic);
        assert_eq!(entry.reason.as_deref(), Some("speed below 2 km/h for 60s"));
        assert_eq!(entry.timestamp, T0 + 62.0);
    }

    #[test]
    fn test_speed_recovery_cancels_pause_detection() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.location(T0 + 1.0, 40.0, 0.2);
        let token = rig.engine.pending_timer(TimerKind::PauseDetection).unwrap();
        let effects = rig.location(T0 + 10.0, 40.0 + STEP_DEG, 10.0);
        assert!(cancelled(&effects, TimerKind::PauseDetection));

        let effects = rig.engine.handle(EngineEvent::TimerFired(token)).unwrap();
        assert!(effects.is_empty());
        assert_eq!(rig.engine.state(), RecordingState::Recording);
    }

    #[test]
    fn test_auto_end_after_pause() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.location(T0 + 1.0, 40.0, 0.0);
        rig.fire(TimerKind::PauseDetection);
        let effects = rig.fire(TimerKind::EndDetection);

        assert_eq!(rig.engine.state(), RecordingState::Ended);
        assert!(effects.contains(&Effect::StateChanged {
            from: RecordingState::Paused,
            to: RecordingState::Ended,
            automatic: true,
        }));
        let ride = rig.engine.ride().unwrap();
        assert_eq!(ride.end_time, Some(T0 + 1.0 + 60.0 + 480.0));
        let actions: Vec<AuditAction> = ride.audit_log().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::Start, AuditAction::Pause, AuditAction::End]);
    }

    #[test]
    fn test_manual_pause_cancels_pause_timer() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.location(T0 + 1.0, 40.0, 0.0);
        let token = rig.engine.pending_timer(TimerKind::PauseDetection).unwrap();

        let effects = rig.command(Command::Pause).unwrap();
        assert!(cancelled(&effects, TimerKind::PauseDetection));
        assert!(rig.engine.handle(EngineEvent::TimerFired(token)).unwrap().is_empty());

        rig.command(Command::Resume).unwrap();
        assert_eq!(rig.engine.state(), RecordingState::Recording);
        assert!(rig.engine.pending_timer(TimerKind::EndDetection).is_none());
        assert_eq!(rig.engine.ride().unwrap().audit_log().len(), 3);
    }

    #[test]
    fn test_distance_frozen_while_paused() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        let mut last = 0.0;
        for i in 1..=5 {
            rig.location(T0 + i as f64, 40.0 + i as f64 * STEP_DEG, 11.0);
            let distance = rig.engine.snapshot().distance_m;
            assert!(distance >= last);
            last = distance;
        }
        assert!(last > 40.0);

        rig.command(Command::Pause).unwrap();
        for i in 6..=10 {
            rig.location(T0 + i as f64, 40.0 + i as f64 * STEP_DEG, 11.0);
        }
        assert_eq!(rig.engine.snapshot().distance_m, last);
        assert_eq!(rig.engine.ride().unwrap().route.len(), 5);

        // The gap across the pause is not counted either
        rig.command(Command::Resume).unwrap();
        rig.location(T0 + 11.0, 40.0 + 11.0 * STEP_DEG, 11.0);
        assert_eq!(rig.engine.snapshot().distance_m, last);
        rig.location(T0 + 12.0, 40.0 + 12.0 * STEP_DEG, 11.0);
        assert!(rig.engine.snapshot().distance_m > last);
    }

    #[test]
    fn test_auto_resume_after_auto_pause() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.location(T0 + 1.0, 40.0, 0.0);
        rig.fire(TimerKind::PauseDetection);

        for i in 0..3 {
            rig.motion(T0 + 100.0 + i as f64, ActivityType::Automotive);
        }
        let effects = rig.location(T0 + 104.0, 40.0 + STEP_DEG, 12.0);
        assert_eq!(rig.engine.state(), RecordingState::Recording);
        assert!(cancelled(&effects, TimerKind::EndDetection));
        assert!(effects.contains(&Effect::SetSamplingPrecision {
            precision: SamplingPrecision::High
        }));
        let entry = rig.engine.audit_log().last().unwrap();
        assert_eq!(entry.action, AuditAction::Resume);
        assert!(entry.automatic);
    }

    #[test]
    fn test_manual_pause_is_not_auto_resumed() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.command(Command::Pause).unwrap();
        for i in 0..3 {
            rig.motion(T0 + 1.0 + i as f64, ActivityType::Automotive);
        }
        rig.location(T0 + 5.0, 40.0, 15.0);
        assert_eq!(rig.engine.state(), RecordingState::Paused);
    }

    #[test]
    fn test_driving_during_manual_pause_defers_auto_end() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.command(Command::Pause).unwrap();
        let first_deadline = rig.engine.pending_timer(TimerKind::EndDetection).unwrap();

        // Eight minutes of driving at 54 km/h without resuming
        for i in 1..=48 {
            let t = T0 + i as f64 * 10.0;
            rig.motion(t - 0.5, ActivityType::Automotive);
            rig.location(t, 40.0 + i as f64 * 0.00135, 15.0);
        }
        assert!(rig.engine.handle(EngineEvent::TimerFired(first_deadline)).unwrap().is_empty());
        assert_eq!(rig.engine.state(), RecordingState::Paused);

        let deadline = rig.engine.pending_timer(TimerKind::EndDetection).unwrap();
        assert_eq!(deadline.due_at, T0 + 480.0 + 480.0);
        assert_eq!(rig.engine.audit_log().len(), 2);
    }

    #[test]
    fn test_manual_pause_auto_ends_when_idle() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.command(Command::Pause).unwrap();
        rig.fire(TimerKind::EndDetection);

        assert_eq!(rig.engine.state(), RecordingState::Ended);
        let entry = rig.engine.audit_log().last().unwrap();
        assert_eq!(entry.action, AuditAction::End);
        assert!(entry.automatic);
        assert_eq!(rig.engine.ride().unwrap().end_time, Some(T0 + 480.0));
    }

    #[test]
    fn test_enabling_automatic_while_paused_arms_end_detection() {
        let mut rig = Rig::new(RecordingConfig {
            automatic: false,
            ..RecordingConfig::default()
        });
        rig.command(Command::Start).unwrap();
        let effects = rig.command(Command::Pause).unwrap();
        assert!(!scheduled(&effects, TimerKind::EndDetection));

        rig.clock.set(T0 + 30.0);
        let effects = rig
            .command(Command::SetMode {
                mode: RecordingMode::Automatic,
            })
            .unwrap();
        assert!(scheduled(&effects, TimerKind::EndDetection));
        let token = rig.engine.pending_timer(TimerKind::EndDetection).unwrap();
        assert_eq!(token.due_at, T0 + 30.0 + 480.0);
    }

    #[test]
    fn test_manual_mode_disables_automation() {
        let mut rig = Rig::new(RecordingConfig {
            automatic: false,
            ..RecordingConfig::default()
        });
        let effects = rig.detect_drive(T0);
        assert!(effects.is_empty());

        rig.command(Command::Start).unwrap();
        let effects = rig.location(T0 + 10.0, 40.0 + STEP_DEG, 0.0);
        assert!(!scheduled(&effects, TimerKind::PauseDetection));
    }

    #[test]
    fn test_switching_to_manual_cancels_timers() {
        let mut rig = Rig::auto();
        rig.detect_drive(T0);
        let effects = rig
            .command(Command::SetMode {
                mode: RecordingMode::Manual,
            })
            .unwrap();
        assert!(cancelled(&effects, TimerKind::StartCountdown));
        assert_eq!(rig.engine.mode(), RecordingMode::Manual);
    }

    #[test]
    fn test_end_odometer_only_after_end() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        let result = rig.command(Command::SubmitEndOdometer { value: 15_010.0 });
        assert!(matches!(result, Err(RideTrackerError::InvalidTransition { .. })));
    }

    #[test]
    fn test_end_odometer_below_start_rejected() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.command(Command::End).unwrap();
        let result = rig.command(Command::SubmitEndOdometer { value: 14_000.0 });
        assert!(matches!(result, Err(RideTrackerError::InvalidOdometer(_))));
        assert_eq!(rig.engine.ride().unwrap().end_odometer, None);
    }

    #[test]
    fn test_reconciliation_resolution_keeps_audit_trail() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.command(Command::End).unwrap();

        let effects = rig
            .command(Command::SubmitEndOdometer { value: 15_050.0 })
            .unwrap();
        assert!(matches!(effects[0], Effect::ReconciliationRequired { .. }));
        assert!(rig.engine.pending_reconciliation().is_some());
        assert_eq!(rig.engine.ride().unwrap().end_odometer, None);

        rig.command(Command::ResolveReconciliation {
            resolution: Resolution::KeepOdometer,
            reason: Some("GPS lost in tunnel".to_string()),
        })
        .unwrap();

        let ride = rig.engine.ride().unwrap();
        assert_eq!(ride.end_odometer, Some(15_050.0));
        let last = ride.audit_log().last().unwrap();
        assert_eq!(last.action, AuditAction::Reconciled);
        assert!(last.reason.as_deref().unwrap().ends_with("GPS lost in tunnel"));
        assert_eq!(ride.audit_log().len(), 3);

        assert!(matches!(
            rig.command(Command::ResolveReconciliation {
                resolution: Resolution::UseGps,
                reason: None,
            }),
            Err(RideTrackerError::NoPendingReconciliation)
        ));
    }

    #[test]
    fn test_second_end_odometer_rejected() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.command(Command::End).unwrap();
        // No GPS distance and no odometer distance agree exactly
        assert!(rig
            .command(Command::SubmitEndOdometer { value: 15_000.0 })
            .unwrap()
            .is_empty());

        let result = rig.command(Command::SubmitEndOdometer { value: 15_010.0 });
        assert!(matches!(result, Err(RideTrackerError::InvalidTransition { .. })));
        let ride = rig.engine.ride().unwrap();
        assert_eq!(ride.end_odometer, Some(15_000.0));
        assert_eq!(ride.audit_log().len(), 3);
    }

    #[test]
    fn test_use_gps_rewrites_end_odometer() {
        let mut rig = Rig::auto();
        rig.command(Command::Start).unwrap();
        rig.command(Command::End).unwrap();
        rig.command(Command::SubmitEndOdometer { value: 15_100.0 }).unwrap();
        rig.command(Command::ResolveReconciliation {
            resolution: Resolution::UseGps,
            reason: None,
        })
        .unwrap();
        // No GPS distance was recorded
        assert_eq!(rig.engine.ride().unwrap().end_odometer, Some(15_000.0));
    }

    #[test]
    fn test_snapshot_before_start() {
        let rig = Rig::auto();
        let snapshot = rig.engine.snapshot();
        assert_eq!(snapshot.state, RecordingState::NotStarted);
        assert_eq!(snapshot.ride_id, None);
        assert_eq!(snapshot.distance_m, 0.0);
        assert!(snapshot.route.is_empty());
    }

    #[test]
    fn test_rejected_start_odometer() {
        let clock = Arc::new(ManualClock::new(T0));
        assert!(RecordingEngine::new(RecordingConfig::default(), -1.0, clock).is_err());
    }
}
