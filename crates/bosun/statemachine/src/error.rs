//! State machine error types

use thiserror::Error;

/// Failure reported by an action
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Unexpected operation: {0}")]
    UnexpectedOperation(String),

    #[error("Action cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

/// State machine errors
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("No transition defined for state {0}")]
    NoTransition(String),

    #[error("Action {action} failed: {source}")]
    Action {
        action: String,
        #[source]
        source: ActionError,
    },
}

/// Result type for state machine operations
pub type Result<T> = std::result::Result<T, StateMachineError>;
