//! Routing action for the waiting application states

use super::{ApplicationAction, ApplicationContext, ApplicationMachine};
use async_trait::async_trait;
use bosun_statemachine::{Action, ActionError, ActionFactory, MachineContext, MachineState, StateData};
use bosun_types::{ApplicationOperation, ApplicationState};
use std::sync::Arc;
use tracing::{debug, warn};

/// Moves a waiting application into the state that handles its pending operation
///
/// The operation stays pending for the action of the target state, except
/// for a repeated creation, which is acknowledged and dropped.
#[derive(Debug, Default)]
pub struct RouteAction;

#[async_trait]
impl Action<ApplicationMachine> for RouteAction {
    fn name(&self) -> &str {
        "route"
    }

    async fn execute(
        &self,
        context: &ApplicationContext,
        current: &MachineState<ApplicationMachine>,
    ) -> Result<Option<MachineState<ApplicationMachine>>, ActionError> {
        let Some(operation) = context.updates().get() else {
            return Ok(None);
        };
        let next = match operation {
            ApplicationOperation::Destroy { .. } => ApplicationState::DestroyRequested,
            ApplicationOperation::StopInstances { .. } => ApplicationState::StopInstancesRequested,
            ApplicationOperation::Scale { .. } => ApplicationState::ScalingRequested,
            ApplicationOperation::ReplaceInstances { .. } => ApplicationState::ReplaceInstancesRequested,
            ApplicationOperation::Recover { .. } => ApplicationState::OutageDetected,
            ApplicationOperation::Create { .. } => {
                debug!(app_id = %context.app_id(), "Ignoring create for existing app");
                context.updates().ack();
                return Ok(None);
            }
            ApplicationOperation::StartInstances { .. } | ApplicationOperation::Suspend { .. } => {
                warn!(app_id = %context.app_id(), op = %operation.op_type(), "Operation was not translated");
                context.updates().ack();
                return Err(ActionError::UnexpectedOperation(operation.op_type().to_string()));
            }
        };
        Ok(Some(StateData::from_previous(current, next)))
    }
}

/// Serves the routing action and delegates every other key to `actions`
pub struct ApplicationActionFactory {
    actions: Arc<dyn ActionFactory<ApplicationMachine>>,
    route: Arc<RouteAction>,
}

impl ApplicationActionFactory {
    pub fn new(actions: Arc<dyn ActionFactory<ApplicationMachine>>) -> Self {
        Self {
            actions,
            route: Arc::new(RouteAction),
        }
    }
}

impl ActionFactory<ApplicationMachine> for ApplicationActionFactory {
    fn create(&self, key: ApplicationAction) -> Arc<dyn Action<ApplicationMachine>> {
        match key {
            ApplicationAction::Route => self.route.clone(),
            other => self.actions.create(other),
        }
    }
}
