//! Bosun State Machine - Generic machine driven by pluggable actions
//!
//! A machine kind is described by a [`StateMachineTypes`] bundle: its data,
//! the update type staged from outside, its states, its context and the key
//! naming the action to run in each state. A transition table maps each
//! source state to an action key and the set of states that action may
//! move to.
//!
//! ## Execution model
//!
//! [`StateMachine::execute`] runs exactly one action. The action either
//! returns a new state, which must be in the transition's target set, or
//! answers "no transition" and the machine stays put. Reached states are
//! delivered to an optional handler channel and acknowledged before the
//! next pass.
//!
//! Updates are staged through [`UpdateSlot`]: one pending update at a time,
//! acked by the action that consumes it.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod action;
pub mod context;
pub mod error;
pub mod machine;
pub mod state;
pub mod transition;

// Re-exports
pub use action::{Action, ActionFactory, CancellableAction, MachineState};
pub use context::{MachineContext, UpdateSlot};
pub use error::{ActionError, Result, StateMachineError};
pub use machine::{StateChange, StateMachine, StateMachineTypes};
pub use state::StateData;
pub use transition::Transition;
