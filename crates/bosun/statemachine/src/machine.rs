//! Generic state machine

use crate::action::{Action, ActionFactory, MachineState};
use crate::context::MachineContext;
use crate::error::{Result, StateMachineError};
use crate::transition::Transition;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Type bundle describing one kind of machine
pub trait StateMachineTypes: Sized + Send + Sync + 'static {
    /// Entity data carried through every state
    type Data: Clone + Send + Sync + 'static;
    /// Operation staged into the context from outside
    type Update: Clone + fmt::Debug + Send + Sync + 'static;
    type State: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Context: MachineContext<Self::Update>;
    /// Identifies the action run in a state; resolved by the factory
    type ActionKey: Copy + Eq + fmt::Debug + Send + Sync + 'static;
}

/// State reached by a machine, delivered to the state change handler
///
/// The machine does not run its next action until `ack` is answered or
/// dropped.
pub struct StateChange<M: StateMachineTypes> {
    pub state: MachineState<M>,
    pub context: Arc<M::Context>,
    pub ack: oneshot::Sender<()>,
}

impl<M: StateMachineTypes> fmt::Debug for StateChange<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateChange")
            .field("state", &self.state.state)
            .finish()
    }
}

pub struct StateMachine<M: StateMachineTypes> {
    name: String,
    current: RwLock<MachineState<M>>,
    transitions: HashMap<M::State, Transition<M::State, M::ActionKey>>,
    context: Arc<M::Context>,
    factory: Arc<dyn ActionFactory<M>>,
    current_action: Mutex<Option<Arc<dyn Action<M>>>>,
    state_changes: Option<mpsc::UnboundedSender<StateChange<M>>>,
}

impl<M: StateMachineTypes> StateMachine<M> {
    /// Machine sitting in `initial`, one transition per source state
    pub fn new(
        name: impl Into<String>,
        initial: MachineState<M>,
        context: Arc<M::Context>,
        factory: Arc<dyn ActionFactory<M>>,
        transitions: Vec<Transition<M::State, M::ActionKey>>,
    ) -> Self {
        Self {
            name: name.into(),
            current: RwLock::new(initial),
            transitions: transitions.into_iter().map(|t| (t.from, t)).collect(),
            context,
            factory,
            current_action: Mutex::new(None),
            state_changes: None,
        }
    }

    /// Deliver every state change to `sender`
    pub fn with_state_change_handler(mut self, sender: mpsc::UnboundedSender<StateChange<M>>) -> Self {
        self.state_changes = Some(sender);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<M::Context> {
        &self.context
    }

    pub fn current_state(&self) -> M::State {
        self.current.read().state
    }

    pub fn current(&self) -> MachineState<M> {
        self.current.read().clone()
    }

    pub fn current_action(&self) -> Option<Arc<dyn Action<M>>> {
        self.current_action.lock().clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.context.updates().is_stopped()
    }

    /// Run the action for the current state once
    ///
    /// Returns the state after the pass, or `None` once the machine has been
    /// stopped.
    pub async fn execute(&self) -> Result<Option<M::State>> {
        if self.is_stopped() {
            return Ok(None);
        }

        let current = self.current();
        let transition = self
            .transitions
            .get(&current.state)
            .ok_or_else(|| StateMachineError::NoTransition(current.state.to_string()))?;

        let action = self.factory.create(transition.action);
        *self.current_action.lock() = Some(action.clone());
        debug!(machine = %self.name, state = %current.state, action = action.name(), "Running action");
        let result = action.execute(&self.context, &current).await;
        *self.current_action.lock() = None;

        let next = match result {
            Ok(Some(next)) => next,
            Ok(None) => return Ok(Some(current.state)),
            Err(source) => {
                return Err(StateMachineError::Action {
                    action: action.name().to_string(),
                    source,
                })
            }
        };

        if !transition.allows(&next.state) {
            return Err(StateMachineError::IllegalTransition {
                from: current.state.to_string(),
                to: next.state.to_string(),
            });
        }

        info!(machine = %self.name, from = %current.state, to = %next.state, "State changed");
        let state = next.state;
        *self.current.write() = next.clone();
        self.signal(next).await;
        Ok(Some(state))
    }

    /// Stage an update for the next action; false if one is already pending
    pub fn notify_update(&self, update: M::Update) -> bool {
        self.context.updates().record(update)
    }

    /// Mark the machine stopped and stop whatever action is in flight
    pub fn stop(&self) {
        self.context.updates().mark_stopped();
        if let Some(action) = self.current_action() {
            action.stop();
        }
    }

    async fn signal(&self, state: MachineState<M>) {
        let Some(sender) = &self.state_changes else {
            return;
        };
        let (ack, done) = oneshot::channel();
        let change = StateChange {
            state,
            context: self.context.clone(),
            ack,
        };
        if sender.send(change).is_ok() {
            // A dropped ack means the handler is gone; carry on regardless
            let _ = done.await;
        }
    }
}
