pub mod machine;
pub mod ride;
pub mod snapshot;
pub mod state;
pub mod timer;

pub use machine::{Command, Effect, EngineEvent, RecordingEngine};
pub use ride::{AuditAction, AuditEntry, Ride};
pub use snapshot::RideSnapshot;
pub use state::{RecordingMode, RecordingState, SamplingPrecision};
pub use timer::{TimerBook, TimerKind, TimerToken};
