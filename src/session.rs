//! Async driver for one recording engine.
//!
//! The engine is owned by a single tokio task. Location, motion and command
//! inputs arrive over one mpsc channel, so they are processed strictly in
//! arrival order. Timer effects become spawned sleeps that post the token
//! back into the same channel.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{RResult, RideTrackerError};
use crate::providers::{ConfirmationPrompt, LocationProvider};
use crate::recording::{
    Command, Effect, EngineEvent, RecordingEngine, RecordingState, Ride, RideSnapshot, TimerKind, TimerToken,
};
use crate::types::{LocationSample, MotionEvent};

const CHANNEL_CAPACITY: usize = 256;

enum SessionInput {
    Feed(EngineEvent),
    Command(Command, oneshot::Sender<RResult<()>>),
    Snapshot(oneshot::Sender<RideSnapshot>),
    Shutdown,
}

/// Caller side of a running session
pub struct SessionHandle {
    tx: mpsc::Sender<SessionInput>,
    state_rx: watch::Receiver<RecordingState>,
    task: JoinHandle<Option<Ride>>,
}

/// Spawn the session task on the current tokio runtime
pub fn spawn_session(
    engine: RecordingEngine,
    provider: Box<dyn LocationProvider>,
    prompt: Box<dyn ConfirmationPrompt>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (state_tx, state_rx) = watch::channel(engine.state());

    let actor = SessionActor {
        engine,
        provider,
        prompt,
        timers: HashMap::new(),
        timer_tx: tx.downgrade(),
        state_tx,
    };
    let task = tokio::spawn(actor.run(rx));

    SessionHandle { tx, state_rx, task }
}

impl SessionHandle {
    pub async fn location(&self, sample: LocationSample) -> RResult<()> {
        self.send(SessionInput::Feed(EngineEvent::Location(sample))).await
    }

    pub async fn motion(&self, event: MotionEvent) -> RResult<()> {
        self.send(SessionInput::Feed(EngineEvent::Motion(event))).await
    }

    /// Apply a user command and wait for the engine's verdict
    pub async fn command(&self, command: Command) -> RResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionInput::Command(command, reply_tx)).await?;
        reply_rx.await.map_err(|_| RideTrackerError::SessionClosed)?
    }

    pub async fn snapshot(&self) -> RResult<RideSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionInput::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| RideTrackerError::SessionClosed)
    }

    /// Last state the engine reported
    pub fn state(&self) -> RecordingState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every lifecycle transition
    pub fn subscribe(&self) -> watch::Receiver<RecordingState> {
        self.state_rx.clone()
    }

    pub async fn wait_for_state(&self, target: RecordingState) -> RResult<()> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map_err(|_| RideTrackerError::SessionClosed)?;
        Ok(())
    }

    /// Stop the task, abort its timers and hand back the ride
    pub async fn finish(self) -> RResult<Option<Ride>> {
        // A closed channel means the task is already gone; join it anyway
        let _ = self.tx.send(SessionInput::Shutdown).await;
        self.task.await.map_err(|_| RideTrackerError::SessionClosed)
    }

    async fn send(&self, input: SessionInput) -> RResult<()> {
        self.tx.send(input).await.map_err(|_| RideTrackerError::SessionClosed)
    }
}

struct SessionActor {
    engine: RecordingEngine,
    provider: Box<dyn LocationProvider>,
    prompt: Box<dyn ConfirmationPrompt>,
    timers: HashMap<TimerKind, JoinHandle<()>>,
    timer_tx: mpsc::WeakSender<SessionInput>,
    state_tx: watch::Sender<RecordingState>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionInput>) -> Option<Ride> {
        while let Some(input) = rx.recv().await {
            match input {
                SessionInput::Feed(event) => {
                    if let Err(e) = self.dispatch(event) {
                        log::warn!("session event failed: {}", e);
                    }
                }
                SessionInput::Command(command, reply) => {
                    let result = self.dispatch(EngineEvent::Command(command));
                    let _ = reply.send(result);
                }
                SessionInput::Snapshot(reply) => {
                    let _ = reply.send(self.engine.snapshot());
                }
                SessionInput::Shutdown => break,
            }
        }

        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        log::info!("session stopped in {:?}", self.engine.state());
        self.engine.into_ride()
    }

    fn dispatch(&mut self, event: EngineEvent) -> RResult<()> {
        let effects = self.engine.handle(event)?;
        for effect in effects {
            self.apply(effect);
        }
        Ok(())
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::StateChanged { to, .. } => {
                self.state_tx.send_replace(to);
            }
            Effect::ScheduleTimer { token, delay_secs } => self.schedule(token, delay_secs),
            Effect::CancelTimer { kind } => {
                if let Some(timer) = self.timers.remove(&kind) {
                    timer.abort();
                }
            }
            Effect::RequestStartConfirmation => {
                let snapshot = self.engine.snapshot();
                self.prompt.request_start_confirmation(&snapshot);
            }
            Effect::SetSamplingPrecision { precision } => self.provider.set_precision(precision),
            Effect::ReconciliationRequired { comparison } => {
                log::debug!("awaiting reconciliation decision: {:?}", comparison);
            }
        }
    }

    fn schedule(&mut self, token: TimerToken, delay_secs: f64) {
        let weak = self.timer_tx.clone();
        let delay = Duration::from_secs_f64(delay_secs.max(0.0));
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(SessionInput::Feed(EngineEvent::TimerFired(token))).await;
            }
        });
        if let Some(previous) = self.timers.insert(token.kind, timer) {
            previous.abort();
        }
    }
}
