//! Engine error types

use bosun_statemachine::StateMachineError;
use thiserror::Error;

/// Engine errors
///
/// Admission failures are not errors; they come back as a
/// [`ValidationResult`](bosun_types::ValidationResult).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn load_failure() -> Result<()> {
        Err(config::ConfigError::Message("missing field `admission`".to_string()))?;
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::from(StateMachineError::NoTransition("RUNNING".to_string()));
        assert_eq!(
            err.to_string(),
            "State machine error: No transition defined for state RUNNING"
        );

        let err = load_failure().unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: missing field `admission`");
    }
}
