//! Deployable lifecycle engine
//!
//! One engine per deployable kind keeps a registry of `id -> executor`.
//! Operations are validated first. The first accepted operation for an id
//! creates its actor; later ones are translated by the kind and staged into
//! the existing actor. State changes reached by any actor are handled on a
//! dedicated task, one at a time, and each actor waits for its change to be
//! handled before it runs its next action.

use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::executor::{LifecycleMachine, StateMachineExecutor};
use crate::validator::{CommandValidator, EngineView};
use bosun_statemachine::{ActionFactory, MachineState, StateChange, StateMachine, StateMachineTypes};
use bosun_types::{ClusterOpSpec, DeployableId, ValidationResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

/// State type of a kind's machine
pub type KindState<K> = <<K as DeployableKind>::Machine as StateMachineTypes>::State;

/// Context type of a kind's machine
pub type KindContext<K> = <<K as DeployableKind>::Machine as StateMachineTypes>::Context;

type KindExecutor<K> = StateMachineExecutor<<K as DeployableKind>::Machine>;

/// Everything that differs between applications and local services
pub trait DeployableKind: Send + Sync + Sized + 'static {
    type Machine: LifecycleMachine<Update = Self::Operation>;
    type Operation: Clone + fmt::Debug + Send + Sync + 'static;
    type Spec;

    /// Tag used in logs and spans
    const JOB_TYPE: &'static str;

    fn operation_id(operation: &Self::Operation) -> DeployableId;

    fn context_id(context: &KindContext<Self>) -> DeployableId;

    /// Rewrite an operation before it is staged into an existing actor
    fn translate_op(&self, operation: Self::Operation, default_op_spec: &ClusterOpSpec) -> Self::Operation;

    /// Machine for a creation operation; `None` for anything else
    fn create_machine(
        &self,
        operation: &Self::Operation,
        factory: Arc<dyn ActionFactory<Self::Machine>>,
    ) -> Option<StateMachine<Self::Machine>>;

    /// React to a state reached by the actor of `id`
    fn on_state_change(
        &self,
        engine: &DeployableLifecycleEngine<Self>,
        id: &DeployableId,
        new_state: &MachineState<Self::Machine>,
        context: &KindContext<Self>,
    );
}

pub struct DeployableLifecycleEngine<K: DeployableKind> {
    kind: K,
    executors: DashMap<DeployableId, Arc<KindExecutor<K>>>,
    factory: Arc<dyn ActionFactory<K::Machine>>,
    validator: Arc<dyn CommandValidator<K>>,
    events: Arc<dyn EventBus>,
    config: EngineConfig,
    state_tx: mpsc::UnboundedSender<StateChange<K::Machine>>,
    completed_tx: mpsc::UnboundedSender<Arc<KindExecutor<K>>>,
}

impl<K: DeployableKind> DeployableLifecycleEngine<K> {
    /// Create the engine and spawn its state change handler and reaper tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        kind: K,
        factory: Arc<dyn ActionFactory<K::Machine>>,
        validator: Arc<dyn CommandValidator<K>>,
        events: Arc<dyn EventBus>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (state_tx, state_rx) = mpsc::unbounded_channel();
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            kind,
            executors: DashMap::new(),
            factory,
            validator,
            events,
            config,
            state_tx,
            completed_tx,
        });

        tokio::spawn(
            Self::handle_state_changes(Arc::downgrade(&engine), state_rx)
                .instrument(info_span!("state_change_handler", job_type = K::JOB_TYPE)),
        );
        tokio::spawn(
            Self::reap_completed(completed_rx)
                .instrument(info_span!("executor_reaper", job_type = K::JOB_TYPE)),
        );
        engine
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<dyn EventBus> {
        &self.events
    }

    /// Validate an operation and route it to its actor
    #[instrument(skip(self, operation), fields(job_type = K::JOB_TYPE, deployable_id = tracing::field::Empty))]
    pub fn handle_operation(&self, operation: K::Operation) -> ValidationResult {
        let id = K::operation_id(&operation);
        tracing::Span::current().record("deployable_id", tracing::field::display(&id));

        let result = self.validator.validate_operation(self, &operation);
        if !result.is_success() {
            debug!(messages = ?result.messages, "Operation rejected");
            return result;
        }

        match self.executors.entry(id.clone()) {
            Entry::Occupied(entry) => {
                let translated = self.kind.translate_op(operation, &self.config.default_op_spec);
                if !entry.get().notify_update(translated) {
                    warn!("Update could not be sent");
                }
            }
            Entry::Vacant(entry) => {
                info!("Deployable is unknown. Going to create it now.");
                let Some(executor) = self.create_deployable(&id, operation) else {
                    error!("Operation cannot create a deployable");
                    return ValidationResult::failure(format!("Could not create deployable {}", id));
                };
                executor.start();
                entry.insert(executor);
            }
        }
        result
    }

    pub fn validate_spec(&self, spec: &K::Spec) -> ValidationResult {
        self.validator.validate_spec(spec)
    }

    pub fn current_state(&self, id: &DeployableId) -> Option<KindState<K>> {
        self.executors.get(id).map(|executor| executor.current_state())
    }

    pub fn exists(&self, id: &DeployableId) -> bool {
        self.executors.contains_key(id)
    }

    pub fn deployable_ids(&self) -> Vec<DeployableId> {
        self.executors.iter().map(|e| e.key().clone()).collect()
    }

    /// Deregister the actor of `id`; it is stopped once its loop exits
    pub fn remove_deployable(&self, id: &DeployableId) -> bool {
        self.executors.remove(id).is_some()
    }

    /// Run `cleanup` and deregister the actor of `id` as one step
    ///
    /// `cleanup` only runs if the actor is registered. It runs while the
    /// registry entry is held, so an operation creating the same id waits
    /// until both are done. It must not call back into the engine.
    pub fn remove_deployable_with(&self, id: &DeployableId, cleanup: impl FnOnce()) -> bool {
        match self.executors.entry(id.clone()) {
            Entry::Occupied(entry) => {
                cleanup();
                entry.remove();
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Cancel the cluster job of the action currently running for `id`
    ///
    /// False when the id is unknown, nothing runs, or the running action
    /// cannot be cancelled.
    pub fn cancel_current_job(&self, id: &DeployableId) -> bool {
        let Some(executor) = self.executors.get(id).map(|e| e.value().clone()) else {
            return false;
        };
        let machine = executor.state_machine();
        let Some(action) = machine.current_action() else {
            return false;
        };
        match action.as_cancellable() {
            Some(cancellable) => cancellable.cancel(machine.context().as_ref()),
            None => false,
        }
    }

    /// Deregister and stop every actor
    pub async fn stop_all(&self) {
        let ids = self.deployable_ids();
        let executors: Vec<_> = ids
            .iter()
            .filter_map(|id| self.executors.remove(id).map(|(_, executor)| executor))
            .collect();
        info!(count = executors.len(), job_type = K::JOB_TYPE, "Stopping all state machines");
        futures::future::join_all(executors.iter().map(|executor| executor.stop())).await;
    }

    fn create_deployable(&self, id: &DeployableId, operation: K::Operation) -> Option<Arc<KindExecutor<K>>> {
        let machine = self
            .kind
            .create_machine(&operation, self.factory.clone())?
            .with_state_change_handler(self.state_tx.clone());
        let executor = StateMachineExecutor::new(
            id.clone(),
            K::JOB_TYPE,
            machine,
            self.config.stop_retry.clone(),
            self.config.error_backoff(),
        )
        .with_completion_handler(self.completed_tx.clone());
        let executor = Arc::new(executor);
        executor.notify_update(operation);
        Some(executor)
    }

    async fn handle_state_changes(
        engine: Weak<Self>,
        mut state_rx: mpsc::UnboundedReceiver<StateChange<K::Machine>>,
    ) {
        while let Some(change) = state_rx.recv().await {
            let Some(engine) = engine.upgrade() else {
                break;
            };
            let id = K::context_id(&change.context);
            engine
                .kind
                .on_state_change(&engine, &id, &change.state, &change.context);
            let _ = change.ack.send(());
        }
        debug!("State change handler exited");
    }

    async fn reap_completed(mut completed_rx: mpsc::UnboundedReceiver<Arc<KindExecutor<K>>>) {
        while let Some(executor) = completed_rx.recv().await {
            tokio::spawn(async move {
                executor.stop().await;
                info!(deployable_id = %executor.deployable_id(), "State machine executor is done");
            });
        }
    }
}

impl<K: DeployableKind> EngineView<KindState<K>> for DeployableLifecycleEngine<K> {
    fn exists(&self, id: &DeployableId) -> bool {
        DeployableLifecycleEngine::exists(self, id)
    }

    fn current_state(&self, id: &DeployableId) -> Option<KindState<K>> {
        DeployableLifecycleEngine::current_state(self, id)
    }
}
