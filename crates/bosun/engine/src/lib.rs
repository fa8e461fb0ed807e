//! Bosun Engine - Lifecycle orchestration for deployables
//!
//! Every application and local service gets its own reconciliation actor: a
//! state machine run by a [`StateMachineExecutor`] on a tokio task. The
//! per-kind [`DeployableLifecycleEngine`] owns the registry of actors, runs
//! every incoming operation through a [`CommandValidator`] and routes the
//! accepted ones to the right actor. One-shot tasks are handled separately
//! by the [`TaskEngine`].
//!
//! ## Flow
//!
//! 1. `handle_operation` validates the operation against the actor's state
//!    and, where instances are added, against free cluster capacity
//! 2. The first operation for an id creates the actor, later ones are staged
//!    into it and wake it up
//! 3. Actions injected through an `ActionFactory` do the cluster work
//! 4. Every state reached is handled in order on the engine's handler task
//!    and published on the [`EventBus`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bosun_engine::{ApplicationLifecycleEngine, BroadcastEventBus, EngineConfig};
//! # use bosun_engine::application::{ApplicationAction, ApplicationMachine};
//! # use bosun_statemachine::{Action, ActionFactory};
//! use bosun_statestore::{InMemoryApplicationStore, InMemoryClusterResources, InMemoryInstanceStore};
//! # struct MyActions;
//! # impl ActionFactory<ApplicationMachine> for MyActions {
//! #     fn create(&self, _key: ApplicationAction) -> Arc<dyn Action<ApplicationMachine>> { unimplemented!() }
//! # }
//!
//! # async fn run() -> bosun_engine::Result<()> {
//! let config = EngineConfig::load(Some("bosun.toml"))?;
//! let engine = ApplicationLifecycleEngine::for_applications(
//!     Arc::new(InMemoryApplicationStore::new()),
//!     Arc::new(InMemoryInstanceStore::new()),
//!     Arc::new(InMemoryClusterResources::new()),
//!     Arc::new(MyActions),
//!     Arc::new(BroadcastEventBus::from_config(&config)),
//!     config,
//! );
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod application;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod lifecycle;
pub mod local_service;
pub mod task;
pub mod validator;

// Re-exports
pub use application::{ApplicationCommandValidator, ApplicationKind, ApplicationLifecycleEngine};
pub use config::{AdmissionConfig, EngineConfig, RetrySpec};
pub use error::{EngineError, Result};
pub use events::{BroadcastEventBus, EventBus, EVENT_CHANNEL_CAPACITY};
pub use executor::{LifecycleMachine, StateMachineExecutor};
pub use lifecycle::{DeployableKind, DeployableLifecycleEngine, KindContext, KindState};
pub use local_service::{LocalServiceCommandValidator, LocalServiceKind, LocalServiceLifecycleEngine};
pub use task::{JobExecutor, TaskEngine, TaskJobFactory, TaskRunner, TokioJobExecutor};
pub use validator::{CommandValidator, EngineView};
