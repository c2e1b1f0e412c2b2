// Ride tracking core: location/motion filtering, the recording state machine,
// odometer reconciliation and group expense settlement.

pub mod config;
pub mod error;
pub mod export;
pub mod filters;
pub mod integrator;
pub mod providers;
pub mod reconciliation;
pub mod recording;
pub mod replay;
pub mod session;
pub mod settlement;
pub mod types;

pub use config::{FilterConfig, OdometerUnit, RecordingConfig, SettlementConfig, TrackerConfig};
pub use error::{RResult, RideTrackerError};
pub use reconciliation::{DistanceComparison, OdometerReconciler, ReconciliationOutcome, Resolution};
pub use recording::{Command, Effect, EngineEvent, RecordingEngine, RecordingMode, RecordingState, Ride, RideSnapshot};
pub use session::{spawn_session, SessionHandle};
pub use settlement::{Expense, Ledger, Member, Money, Settlement, SettlementPlan, SettlementSolver, SplitRule};
pub use types::{ActivityType, Confidence, LocationSample, MotionEvent};
