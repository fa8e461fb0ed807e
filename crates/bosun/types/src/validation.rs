//! Admission outcome

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Success,
    Failure,
}

/// Result of running an operation through admission control
///
/// `messages` is never empty. A failure means the operation was not applied
/// and no state changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub messages: Vec<String>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            status: ValidationStatus::Success,
            messages: vec!["Success".to_string()],
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Failure,
            messages: vec![message.into()],
        }
    }

    /// Failure carrying every message; an empty list gets a generic message
    pub fn failures(messages: Vec<String>) -> Self {
        if messages.is_empty() {
            return Self::failure("Validation failed");
        }
        Self {
            status: ValidationStatus::Failure,
            messages,
        }
    }

    /// Success when `errors` is empty, otherwise a failure with all of them
    pub fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            Self::success()
        } else {
            Self::failures(errors)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ValidationStatus::Success
    }
}
