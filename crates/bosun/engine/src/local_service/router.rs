//! Routing action for the waiting local service states

use super::{LocalServiceAction, LocalServiceContext, LocalServiceMachine};
use async_trait::async_trait;
use bosun_statemachine::{Action, ActionError, ActionFactory, MachineContext, MachineState, StateData};
use bosun_types::{LocalServiceOperation, LocalServiceState};
use std::sync::Arc;
use tracing::{debug, info};

/// Moves a waiting local service into the state that handles its pending operation
#[derive(Debug, Default)]
pub struct LocalServiceRouteAction;

#[async_trait]
impl Action<LocalServiceMachine> for LocalServiceRouteAction {
    fn name(&self) -> &str {
        "route"
    }

    async fn execute(
        &self,
        context: &LocalServiceContext,
        current: &MachineState<LocalServiceMachine>,
    ) -> Result<Option<MachineState<LocalServiceMachine>>, ActionError> {
        let Some(operation) = context.updates().get() else {
            return Ok(None);
        };
        info!(service_id = %context.service_id(), op = %operation.op_type(), "Received command");
        let next = match operation {
            LocalServiceOperation::Activate { .. } => LocalServiceState::ActivationRequested,
            LocalServiceOperation::Deactivate { .. } => LocalServiceState::DeactivationRequested,
            LocalServiceOperation::DeployTestInstance { .. } => LocalServiceState::ConfigTestingRequested,
            LocalServiceOperation::UpdateInstanceCount { .. } => LocalServiceState::UpdatingInstancesCount,
            LocalServiceOperation::AdjustInstances { .. } => LocalServiceState::AdjustingInstances,
            LocalServiceOperation::ReplaceInstances { .. } | LocalServiceOperation::Restart { .. } => {
                LocalServiceState::ReplacingInstances
            }
            LocalServiceOperation::StopInstances { .. } => LocalServiceState::StoppingInstances,
            LocalServiceOperation::Destroy { .. } => LocalServiceState::DestroyRequested,
            LocalServiceOperation::Create { .. } => {
                debug!(service_id = %context.service_id(), "Ignoring create for existing local service");
                context.updates().ack();
                return Ok(None);
            }
        };
        Ok(Some(StateData::from_previous(current, next)))
    }
}

/// Serves the routing action and delegates every other key to `actions`
pub struct LocalServiceActionFactory {
    actions: Arc<dyn ActionFactory<LocalServiceMachine>>,
    route: Arc<LocalServiceRouteAction>,
}

impl LocalServiceActionFactory {
    pub fn new(actions: Arc<dyn ActionFactory<LocalServiceMachine>>) -> Self {
        Self {
            actions,
            route: Arc::new(LocalServiceRouteAction),
        }
    }
}

impl ActionFactory<LocalServiceMachine> for LocalServiceActionFactory {
    fn create(&self, key: LocalServiceAction) -> Arc<dyn Action<LocalServiceMachine>> {
        match key {
            LocalServiceAction::Route => self.route.clone(),
            other => self.actions.create(other),
        }
    }
}
