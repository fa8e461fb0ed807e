//! Local service lifecycle
//!
//! Local services run a fixed number of instances on every executor. The
//! per-host count and the activation state live in the service record.

mod context;
mod router;
mod transitions;
mod validator;

pub use context::{LocalServiceAction, LocalServiceContext};
pub use router::{LocalServiceActionFactory, LocalServiceRouteAction};
pub use transitions::local_service_transitions;
pub use validator::{allowed_operations, LocalServiceCommandValidator};

use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::executor::LifecycleMachine;
use crate::lifecycle::{DeployableKind, DeployableLifecycleEngine};
use bosun_statemachine::{ActionFactory, MachineContext, MachineState, StateData, StateMachine, StateMachineTypes};
use bosun_statestore::LocalServiceStateStore;
use bosun_types::{
    ClusterOpSpec, DeployableId, LifecycleEvent, LocalServiceInfo, LocalServiceOperation,
    LocalServiceSpec, LocalServiceState,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct LocalServiceMachine;

impl StateMachineTypes for LocalServiceMachine {
    type Data = LocalServiceInfo;
    type Update = LocalServiceOperation;
    type State = LocalServiceState;
    type Context = LocalServiceContext;
    type ActionKey = LocalServiceAction;
}

impl LifecycleMachine for LocalServiceMachine {
    fn is_paused(state: &LocalServiceState) -> bool {
        transitions::is_paused(state)
    }

    fn is_terminal(state: &LocalServiceState) -> bool {
        state.is_terminal()
    }
}

pub type LocalServiceLifecycleEngine = DeployableLifecycleEngine<LocalServiceKind>;

/// Local service specifics of the lifecycle engine
pub struct LocalServiceKind {
    services: Arc<dyn LocalServiceStateStore>,
}

impl LocalServiceKind {
    pub fn new(services: Arc<dyn LocalServiceStateStore>) -> Self {
        Self { services }
    }

    fn persist_instances_per_host(&self, service_id: &DeployableId, instances_per_host: u32) {
        let Some(info) = self.services.service(service_id) else {
            warn!(service_id = %service_id, "No service record to persist instance count into");
            return;
        };
        if self
            .services
            .update_service(service_id, &info.with_instances_per_host(instances_per_host))
        {
            info!(service_id = %service_id, instances_per_host, "Local service instance count updated");
        } else {
            error!(service_id = %service_id, instances_per_host, "Could not persist local service instance count");
        }
    }
}

impl DeployableKind for LocalServiceKind {
    type Machine = LocalServiceMachine;
    type Operation = LocalServiceOperation;
    type Spec = LocalServiceSpec;

    const JOB_TYPE: &'static str = "LOCAL_SERVICE";

    fn operation_id(operation: &LocalServiceOperation) -> DeployableId {
        operation.service_id()
    }

    fn context_id(context: &LocalServiceContext) -> DeployableId {
        context.service_id().clone()
    }

    fn translate_op(&self, operation: LocalServiceOperation, _default_op_spec: &ClusterOpSpec) -> LocalServiceOperation {
        match operation {
            LocalServiceOperation::Restart {
                service_id,
                stop_first,
                op_spec,
            } => LocalServiceOperation::ReplaceInstances {
                service_id,
                instance_ids: BTreeSet::new(),
                stop_first,
                op_spec,
            },
            other => other,
        }
    }

    fn create_machine(
        &self,
        operation: &LocalServiceOperation,
        factory: Arc<dyn ActionFactory<LocalServiceMachine>>,
    ) -> Option<StateMachine<LocalServiceMachine>> {
        let LocalServiceOperation::Create {
            spec,
            instances_per_host,
            ..
        } = operation
        else {
            return None;
        };
        let info = LocalServiceInfo::new(spec.clone(), *instances_per_host);
        let service_id = info.service_id.clone();
        let context = Arc::new(LocalServiceContext::new(service_id.clone(), spec.clone()));
        Some(StateMachine::new(
            service_id.to_string(),
            StateData::create(LocalServiceState::Init, info),
            context,
            factory,
            local_service_transitions(),
        ))
    }

    fn on_state_change(
        &self,
        engine: &DeployableLifecycleEngine<Self>,
        service_id: &DeployableId,
        new_state: &MachineState<LocalServiceMachine>,
        context: &LocalServiceContext,
    ) {
        let state = new_state.state;
        info!(service_id = %service_id, state = %state, "Local service state changed");
        match state {
            LocalServiceState::UpdatingInstancesCount => {
                if let Some(LocalServiceOperation::UpdateInstanceCount {
                    instances_per_host, ..
                }) = context.updates().get()
                {
                    self.persist_instances_per_host(service_id, instances_per_host);
                }
            }
            LocalServiceState::Destroyed => {
                let removed = engine.remove_deployable_with(service_id, || {
                    self.services.delete_service(service_id);
                    self.services.delete_all_instances(service_id);
                });
                if removed {
                    info!(service_id = %service_id, "Local service state machine and instance data cleaned up");
                }
            }
            _ => {}
        }
        engine.events().publish(LifecycleEvent::LocalServiceStateChange {
            service_id: service_id.clone(),
            name: context.spec().name.clone(),
            version: context.spec().version.clone(),
            state,
        });
    }
}

impl DeployableLifecycleEngine<LocalServiceKind> {
    /// Local service engine over `services` and the injected actions
    pub fn for_local_services(
        services: Arc<dyn LocalServiceStateStore>,
        actions: Arc<dyn ActionFactory<LocalServiceMachine>>,
        events: Arc<dyn EventBus>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let validator = Arc::new(LocalServiceCommandValidator::new(
            services.clone(),
            config.admission.clone(),
        ));
        Self::new(
            LocalServiceKind::new(services),
            Arc::new(LocalServiceActionFactory::new(actions)),
            validator,
            events,
            config,
        )
    }
}
