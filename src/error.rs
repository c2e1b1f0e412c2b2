use thiserror::Error;

use crate::recording::RecordingState;

/// Ride tracker error types
#[derive(Error, Debug)]
pub enum RideTrackerError {
    #[error("Cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: RecordingState,
    },

    #[error("No auto-start confirmation is pending")]
    NotAwaitingConfirmation,

    #[error("Invalid odometer reading: {0}")]
    InvalidOdometer(String),

    #[error("No odometer reconciliation is pending")]
    NoPendingReconciliation,

    #[error("Invalid expense {id}: {reason}")]
    InvalidExpense { id: String, reason: String },

    #[error("Unknown member {member} referenced by expense {expense}")]
    UnknownMember { member: String, expense: String },

    #[error("Expense {id}: exact amounts sum to {actual}, expected {expected}")]
    SplitMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Expense {id}: percentages sum to {total}, expected 100")]
    InvalidPercentages { id: String, total: f64 },

    #[error("Recording session has shut down")]
    SessionClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for tracker operations
pub type RResult<T> = Result<T, RideTrackerError>;
