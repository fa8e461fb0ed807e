//! State snapshots

/// Current state of a machine together with its data
///
/// `error` is set when the machine moved to this state because something
/// went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateData<S, D> {
    pub state: S,
    pub data: D,
    pub error: Option<String>,
}

impl<S: Copy, D: Clone> StateData<S, D> {
    pub fn create(state: S, data: D) -> Self {
        Self {
            state,
            data,
            error: None,
        }
    }

    /// Same data and error, new state
    pub fn from_previous(old: &StateData<S, D>, state: S) -> Self {
        Self {
            state,
            data: old.data.clone(),
            error: old.error.clone(),
        }
    }

    pub fn error_from(old: &StateData<S, D>, state: S, error: impl Into<String>) -> Self {
        Self {
            state,
            data: old.data.clone(),
            error: Some(error.into()),
        }
    }
}
