//! Local service actor context and action keys

use bosun_statemachine::{MachineContext, UpdateSlot};
use bosun_types::{DeployableId, LocalServiceOperation, LocalServiceSpec};
use parking_lot::Mutex;

#[derive(Debug)]
pub struct LocalServiceContext {
    service_id: DeployableId,
    spec: LocalServiceSpec,
    updates: UpdateSlot<LocalServiceOperation>,
    job_id: Mutex<Option<String>>,
}

impl LocalServiceContext {
    pub fn new(service_id: DeployableId, spec: LocalServiceSpec) -> Self {
        Self {
            service_id,
            spec,
            updates: UpdateSlot::new(),
            job_id: Mutex::new(None),
        }
    }

    pub fn service_id(&self) -> &DeployableId {
        &self.service_id
    }

    pub fn spec(&self) -> &LocalServiceSpec {
        &self.spec
    }

    pub fn job_id(&self) -> Option<String> {
        self.job_id.lock().clone()
    }

    pub fn set_job_id(&self, job_id: Option<String>) {
        *self.job_id.lock() = job_id;
    }
}

impl MachineContext<LocalServiceOperation> for LocalServiceContext {
    fn updates(&self) -> &UpdateSlot<LocalServiceOperation> {
        &self.updates
    }
}

/// Action run in each local service state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalServiceAction {
    Create,
    /// Built in; see [`super::LocalServiceRouteAction`]
    Route,
    Activate,
    Deactivate,
    DeployTestInstance,
    UpdateInstanceCount,
    AdjustInstances,
    ReplaceInstances,
    StopInstances,
    /// Waits in EMERGENCY_DEACTIVATION_REQUESTED for the deactivation
    EmergencyDeactivation,
    Destroy,
}
