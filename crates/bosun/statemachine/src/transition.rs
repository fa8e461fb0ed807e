//! Transition table entries

use std::collections::HashSet;
use std::hash::Hash;

/// From `from`, run `action`, land in one of `to`
#[derive(Debug, Clone)]
pub struct Transition<S, K> {
    pub from: S,
    pub action: K,
    pub to: HashSet<S>,
}

impl<S: Eq + Hash, K> Transition<S, K> {
    pub fn new(from: S, action: K, to: impl IntoIterator<Item = S>) -> Self {
        Self {
            from,
            action,
            to: to.into_iter().collect(),
        }
    }

    pub fn allows(&self, state: &S) -> bool {
        self.to.contains(state)
    }
}
