//! Application lifecycle
//!
//! Applications are long-running, horizontally scaled deployables. The
//! desired instance count lives in the application record and is written
//! before any scaling work is dispatched.

mod context;
mod router;
mod transitions;
mod validator;

pub use context::{ApplicationAction, ApplicationContext};
pub use router::{ApplicationActionFactory, RouteAction};
pub use transitions::application_transitions;
pub use validator::{allowed_operations, ApplicationCommandValidator};

use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::executor::LifecycleMachine;
use crate::lifecycle::{DeployableKind, DeployableLifecycleEngine};
use bosun_statemachine::{ActionFactory, MachineContext, MachineState, StateData, StateMachine, StateMachineTypes};
use bosun_statestore::{ApplicationStateStore, ClusterResourcesStore, InstanceInfoStore};
use bosun_types::{
    ApplicationInfo, ApplicationOperation, ApplicationSpec, ApplicationState, ClusterOpSpec,
    DeployableId, InstanceState, LifecycleEvent,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Type bundle of the application state machine
#[derive(Debug)]
pub struct ApplicationMachine;

impl StateMachineTypes for ApplicationMachine {
    type Data = ApplicationInfo;
    type Update = ApplicationOperation;
    type State = ApplicationState;
    type Context = ApplicationContext;
    type ActionKey = ApplicationAction;
}

impl LifecycleMachine for ApplicationMachine {
    fn is_paused(state: &ApplicationState) -> bool {
        transitions::is_paused(state)
    }

    fn is_terminal(state: &ApplicationState) -> bool {
        state.is_terminal()
    }
}

pub type ApplicationLifecycleEngine = DeployableLifecycleEngine<ApplicationKind>;

/// Application specifics of the lifecycle engine
pub struct ApplicationKind {
    applications: Arc<dyn ApplicationStateStore>,
    instances: Arc<dyn InstanceInfoStore>,
}

impl ApplicationKind {
    pub fn new(applications: Arc<dyn ApplicationStateStore>, instances: Arc<dyn InstanceInfoStore>) -> Self {
        Self {
            applications,
            instances,
        }
    }

    fn persist_instance_count(&self, app_id: &DeployableId, instances: u64) {
        match self.applications.application(app_id) {
            Some(info) => {
                if self
                    .applications
                    .update_application_state(app_id, &info.with_instances(instances))
                {
                    info!(app_id = %app_id, instances, "App instances updated");
                } else {
                    error!(app_id = %app_id, instances, "Could not persist app instance count");
                }
            }
            None => warn!(app_id = %app_id, "No app record to persist instance count into"),
        }
    }

    fn scaling_operation(&self, app_id: &DeployableId, context: &ApplicationContext, default_op_spec: &ClusterOpSpec) -> ApplicationOperation {
        match context.updates().get() {
            Some(ApplicationOperation::Scale {
                app_id: target,
                required_instances,
                op_spec,
            }) => {
                self.persist_instance_count(&target, required_instances);
                ApplicationOperation::Scale {
                    app_id: target,
                    required_instances,
                    op_spec,
                }
            }
            _ => {
                let expected = self
                    .applications
                    .application(app_id)
                    .map(|info| info.instances)
                    .unwrap_or(0);
                info!(
                    app_id = %app_id,
                    instances = expected,
                    "App is in scaling requested state. Setting appropriate operation to scale app"
                );
                ApplicationOperation::Scale {
                    app_id: app_id.clone(),
                    required_instances: expected,
                    op_spec: default_op_spec.clone(),
                }
            }
        }
    }
}

impl DeployableKind for ApplicationKind {
    type Machine = ApplicationMachine;
    type Operation = ApplicationOperation;
    type Spec = ApplicationSpec;

    const JOB_TYPE: &'static str = "APPLICATION";

    fn operation_id(operation: &ApplicationOperation) -> DeployableId {
        operation.app_id()
    }

    fn context_id(context: &ApplicationContext) -> DeployableId {
        context.app_id().clone()
    }

    fn translate_op(&self, operation: ApplicationOperation, default_op_spec: &ClusterOpSpec) -> ApplicationOperation {
        match operation {
            ApplicationOperation::StartInstances {
                app_id,
                instances,
                op_spec,
            } => {
                let healthy = self.instances.instance_count(&app_id, &[InstanceState::Healthy]) as u64;
                info!(app_id = %app_id, healthy, instances, "Translating start instances op to scaling op");
                ApplicationOperation::Scale {
                    app_id,
                    required_instances: healthy + instances,
                    op_spec,
                }
            }
            ApplicationOperation::Suspend { app_id, op_spec } => {
                info!(app_id = %app_id, "Translating suspend op to scaling op");
                ApplicationOperation::Scale {
                    app_id,
                    required_instances: 0,
                    op_spec: op_spec.unwrap_or_else(|| default_op_spec.clone()),
                }
            }
            other => other,
        }
    }

    fn create_machine(
        &self,
        operation: &ApplicationOperation,
        factory: Arc<dyn ActionFactory<ApplicationMachine>>,
    ) -> Option<StateMachine<ApplicationMachine>> {
        let ApplicationOperation::Create { spec, instances, .. } = operation else {
            return None;
        };
        let info = ApplicationInfo::new(spec.clone(), *instances);
        let app_id = info.app_id.clone();
        let context = Arc::new(ApplicationContext::new(app_id.clone(), spec.clone()));
        Some(StateMachine::new(
            app_id.to_string(),
            StateData::create(ApplicationState::Init, info),
            context,
            factory,
            application_transitions(),
        ))
    }

    fn on_state_change(
        &self,
        engine: &DeployableLifecycleEngine<Self>,
        app_id: &DeployableId,
        new_state: &MachineState<ApplicationMachine>,
        context: &ApplicationContext,
    ) {
        let state = new_state.state;
        info!(app_id = %app_id, state = %state, "App state changed");
        match state {
            ApplicationState::ScalingRequested => {
                let operation = self.scaling_operation(app_id, context, &engine.config().default_op_spec);
                let result = engine.handle_operation(operation);
                if !result.is_success() {
                    error!(app_id = %app_id, messages = ?result.messages, "Error sending command to state machine");
                }
            }
            ApplicationState::Destroyed => {
                let removed = engine.remove_deployable_with(app_id, || {
                    self.applications.delete_application_state(app_id);
                    self.instances.delete_all_instance_states(app_id);
                });
                if removed {
                    info!(app_id = %app_id, "State machine deregistered and app data cleaned up");
                }
            }
            _ => {}
        }
        engine.events().publish(LifecycleEvent::ApplicationStateChange {
            app_id: app_id.clone(),
            name: context.spec().name.clone(),
            version: context.spec().version.clone(),
            state,
        });
    }
}

impl DeployableLifecycleEngine<ApplicationKind> {
    /// Application engine over the given stores and injected actions
    ///
    /// `actions` supplies every action but routing, which is built in.
    pub fn for_applications(
        applications: Arc<dyn ApplicationStateStore>,
        instances: Arc<dyn InstanceInfoStore>,
        cluster: Arc<dyn ClusterResourcesStore>,
        actions: Arc<dyn ActionFactory<ApplicationMachine>>,
        events: Arc<dyn EventBus>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let validator = Arc::new(ApplicationCommandValidator::new(
            applications.clone(),
            instances.clone(),
            cluster,
            config.admission.clone(),
        ));
        Self::new(
            ApplicationKind::new(applications, instances),
            Arc::new(ApplicationActionFactory::new(actions)),
            validator,
            events,
            config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastEventBus;
    use async_trait::async_trait;
    use bosun_statemachine::{Action, ActionError, CancellableAction};
    use bosun_statestore::{InMemoryApplicationStore, InMemoryClusterResources, InMemoryInstanceStore};
    use bosun_types::{
        Executable, ExecutorId, ExecutorResourceSnapshot, InstanceId, InstanceInfo,
    };
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::{sleep, timeout};

    fn spec() -> ApplicationSpec {
        ApplicationSpec::new("TEST_APP", "1", Executable::docker("test:1")).with_resources(1, 512)
    }

    fn healthy(app_id: &DeployableId, id: &str) -> InstanceInfo {
        InstanceInfo {
            app_id: app_id.clone(),
            app_name: "TEST_APP".to_string(),
            instance_id: InstanceId::new(id),
            executor_id: ExecutorId::new("e1"),
            hostname: "e1".to_string(),
            resources: vec![],
            state: InstanceState::Healthy,
            error_message: None,
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    #[test]
    fn test_translate_start_instances_adds_healthy_count() {
        let instances = Arc::new(InMemoryInstanceStore::new());
        let app_id = spec().id();
        for id in ["i1", "i2"] {
            instances.update_instance_state(&app_id, &InstanceId::new(id), &healthy(&app_id, id));
        }
        let kind = ApplicationKind::new(Arc::new(InMemoryApplicationStore::new()), instances);
        let op_spec = ClusterOpSpec {
            parallelism: 4,
            ..Default::default()
        };

        let translated = kind.translate_op(
            ApplicationOperation::StartInstances {
                app_id: app_id.clone(),
                instances: 3,
                op_spec: op_spec.clone(),
            },
            &ClusterOpSpec::default(),
        );
        assert_eq!(
            translated,
            ApplicationOperation::Scale {
                app_id,
                required_instances: 5,
                op_spec,
            }
        );
    }

    #[test]
    fn test_translate_suspend_to_zero() {
        let kind = ApplicationKind::new(
            Arc::new(InMemoryApplicationStore::new()),
            Arc::new(InMemoryInstanceStore::new()),
        );
        let app_id = spec().id();
        let default_op_spec = ClusterOpSpec {
            timeout_ms: 42,
            ..Default::default()
        };

        let translated = kind.translate_op(
            ApplicationOperation::Suspend {
                app_id: app_id.clone(),
                op_spec: None,
            },
            &default_op_spec,
        );
        assert_eq!(
            translated,
            ApplicationOperation::Scale {
                app_id: app_id.clone(),
                required_instances: 0,
                op_spec: default_op_spec.clone(),
            }
        );

        let destroy = ApplicationOperation::Destroy {
            app_id,
            op_spec: ClusterOpSpec::default(),
        };
        assert_eq!(kind.translate_op(destroy.clone(), &default_op_spec), destroy);
    }

    /// Records the app and waits in MONITORING
    struct Create {
        applications: Arc<InMemoryApplicationStore>,
    }

    #[async_trait]
    impl Action<ApplicationMachine> for Create {
        fn name(&self) -> &str {
            "create"
        }

        async fn execute(
            &self,
            context: &ApplicationContext,
            current: &MachineState<ApplicationMachine>,
        ) -> Result<Option<MachineState<ApplicationMachine>>, ActionError> {
            context.updates().ack();
            self.applications
                .update_application_state(context.app_id(), &current.data.with_instances(0));
            Ok(Some(StateData::from_previous(current, ApplicationState::Monitoring)))
        }
    }

    /// Blocks until its job is cancelled
    #[derive(Default)]
    struct BlockingScale {
        cancelled: Notify,
    }

    #[async_trait]
    impl Action<ApplicationMachine> for BlockingScale {
        fn name(&self) -> &str {
            "scale"
        }

        async fn execute(
            &self,
            context: &ApplicationContext,
            current: &MachineState<ApplicationMachine>,
        ) -> Result<Option<MachineState<ApplicationMachine>>, ActionError> {
            context.set_job_id(Some("scale-job".to_string()));
            self.cancelled.notified().await;
            context.set_job_id(None);
            context.updates().ack();
            Ok(Some(StateData::error_from(current, ApplicationState::Monitoring, "Scaling cancelled")))
        }

        fn as_cancellable(&self) -> Option<&dyn CancellableAction<ApplicationContext>> {
            Some(self)
        }
    }

    impl CancellableAction<ApplicationContext> for BlockingScale {
        fn cancel(&self, context: &ApplicationContext) -> bool {
            if context.job_id().is_none() {
                return false;
            }
            self.cancelled.notify_one();
            true
        }
    }

    struct Actions {
        create: Arc<Create>,
        scale: Arc<BlockingScale>,
    }

    impl ActionFactory<ApplicationMachine> for Actions {
        fn create(&self, key: ApplicationAction) -> Arc<dyn Action<ApplicationMachine>> {
            match key {
                ApplicationAction::Scale => self.scale.clone(),
                _ => self.create.clone(),
            }
        }
    }

    fn engine() -> (Arc<ApplicationLifecycleEngine>, Arc<InMemoryApplicationStore>) {
        let applications = Arc::new(InMemoryApplicationStore::new());
        let cluster = Arc::new(InMemoryClusterResources::new());
        cluster.add_executor(ExecutorResourceSnapshot {
            executor_id: ExecutorId::new("e1"),
            hostname: "e1".to_string(),
            free_cores: BTreeMap::from([(0, (0..4).collect())]),
            free_memory: BTreeMap::from([(0, 4096)]),
            layout: None,
            blacklisted: false,
        });
        let actions = Arc::new(Actions {
            create: Arc::new(Create {
                applications: applications.clone(),
            }),
            scale: Arc::new(BlockingScale::default()),
        });
        let engine = ApplicationLifecycleEngine::for_applications(
            applications.clone(),
            Arc::new(InMemoryInstanceStore::new()),
            cluster,
            actions,
            Arc::new(BroadcastEventBus::default()),
            EngineConfig::default(),
        );
        (engine, applications)
    }

    fn create_op() -> ApplicationOperation {
        ApplicationOperation::Create {
            spec: spec(),
            instances: 0,
            op_spec: ClusterOpSpec::default(),
        }
    }

    async fn wait_for_state(engine: &ApplicationLifecycleEngine, app_id: &DeployableId, state: ApplicationState) {
        timeout(Duration::from_secs(5), async {
            while engine.current_state(app_id) != Some(state) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{} never reached {}", app_id, state));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_register_one_actor() {
        let (engine, _) = engine();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                tokio::task::spawn_blocking(move || engine.handle_operation(create_op()))
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_success() {
                accepted += 1;
            }
        }
        assert!(accepted >= 1);
        assert_eq!(engine.deployable_ids(), vec![spec().id()]);

        wait_for_state(&engine, &spec().id(), ApplicationState::Monitoring).await;
        let result = engine.handle_operation(create_op());
        assert_eq!(result.messages, vec!["App TEST_APP-1 already exists".to_string()]);
        engine.stop_all().await;
        assert!(engine.deployable_ids().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_current_job() {
        let (engine, applications) = engine();
        let app_id = spec().id();
        assert!(!engine.cancel_current_job(&app_id));

        assert!(engine.handle_operation(create_op()).is_success());
        wait_for_state(&engine, &app_id, ApplicationState::Monitoring).await;
        // Parked with nothing in flight
        assert!(!engine.cancel_current_job(&app_id));

        let scale = ApplicationOperation::Scale {
            app_id: app_id.clone(),
            required_instances: 2,
            op_spec: ClusterOpSpec::default(),
        };
        assert!(engine.handle_operation(scale).is_success());
        wait_for_state(&engine, &app_id, ApplicationState::ScalingRequested).await;
        // Desired count is persisted once scaling is requested
        timeout(Duration::from_secs(5), async {
            while applications.application(&app_id).map(|a| a.instances) != Some(2) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        timeout(Duration::from_secs(5), async {
            while !engine.cancel_current_job(&app_id) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        wait_for_state(&engine, &app_id, ApplicationState::Monitoring).await;
        engine.stop_all().await;
    }
}
