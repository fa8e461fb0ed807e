//! Application actor context and action keys

use bosun_statemachine::{MachineContext, UpdateSlot};
use bosun_types::{ApplicationOperation, ApplicationSpec, DeployableId};
use parking_lot::Mutex;

/// Per-application context shared by every action of its machine
#[derive(Debug)]
pub struct ApplicationContext {
    app_id: DeployableId,
    spec: ApplicationSpec,
    updates: UpdateSlot<ApplicationOperation>,
    job_id: Mutex<Option<String>>,
}

impl ApplicationContext {
    pub fn new(app_id: DeployableId, spec: ApplicationSpec) -> Self {
        Self {
            app_id,
            spec,
            updates: UpdateSlot::new(),
            job_id: Mutex::new(None),
        }
    }

    pub fn app_id(&self) -> &DeployableId {
        &self.app_id
    }

    pub fn spec(&self) -> &ApplicationSpec {
        &self.spec
    }

    /// Session id of the cluster job currently run by an action
    pub fn job_id(&self) -> Option<String> {
        self.job_id.lock().clone()
    }

    pub fn set_job_id(&self, job_id: Option<String>) {
        *self.job_id.lock() = job_id;
    }
}

impl MachineContext<ApplicationOperation> for ApplicationContext {
    fn updates(&self) -> &UpdateSlot<ApplicationOperation> {
        &self.updates
    }
}

/// Action run in each application state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationAction {
    Create,
    /// Turns the pending operation into a request state; built in
    Route,
    Recover,
    Scale,
    ReplaceInstances,
    StopInstances,
    Destroy,
}
