use serde::{Deserialize, Serialize};

/// Ride lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingState {
    /// Waiting for a manual start or confirmed auto-start
    NotStarted,
    /// Integrating accepted samples into the ride
    Recording,
    /// Ride open but distance frozen
    Paused,
    /// Terminal
    Ended,
}

impl RecordingState {
    pub fn is_active(&self) -> bool {
        matches!(self, RecordingState::Recording | RecordingState::Paused)
    }
}

/// Whether the engine may take lifecycle decisions on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    Automatic,
    Manual,
}

/// Location sampling policy handed to the platform location provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingPrecision {
    High,
    Reduced,
}
