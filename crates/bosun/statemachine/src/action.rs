//! Actions run by the state machine, one per state

use crate::error::ActionError;
use crate::machine::StateMachineTypes;
use crate::state::StateData;
use async_trait::async_trait;
use std::sync::Arc;

/// Snapshot type of a machine described by `M`
pub type MachineState<M> =
    StateData<<M as StateMachineTypes>::State, <M as StateMachineTypes>::Data>;

/// Work performed while a machine sits in one state
#[async_trait]
pub trait Action<M: StateMachineTypes>: Send + Sync {
    fn name(&self) -> &str;

    /// Run the action and return the next state
    ///
    /// `Ok(None)` means no transition: the machine stays where it is and no
    /// state change is signalled.
    async fn execute(
        &self,
        context: &M::Context,
        current: &MachineState<M>,
    ) -> Result<Option<MachineState<M>>, ActionError>;

    /// Ask an in-flight execution to wind down
    fn stop(&self) {}

    fn as_cancellable(&self) -> Option<&dyn CancellableAction<M::Context>> {
        None
    }
}

/// Action whose in-flight cluster job can be cancelled
pub trait CancellableAction<C>: Send + Sync {
    /// Cancel the running job; false if nothing was cancelled
    fn cancel(&self, context: &C) -> bool;
}

/// Creates the action bound to an action key
pub trait ActionFactory<M: StateMachineTypes>: Send + Sync {
    fn create(&self, key: M::ActionKey) -> Arc<dyn Action<M>>;
}
