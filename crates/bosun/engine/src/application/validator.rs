//! Admission control for applications

use super::ApplicationKind;
use crate::config::AdmissionConfig;
use crate::validator::{
    bracketed, check_allowed, check_device_disabled, check_mandatory_resources, check_resources,
    ensure_cmdl_args, ensure_whitelisted_volumes, port_map, validate_check_spec, CommandValidator,
    EngineView,
};
use bosun_statestore::{ApplicationStateStore, ClusterResourcesStore, InstanceInfoStore};
use bosun_types::{
    ApplicationOperation, ApplicationOperationType, ApplicationSpec, ApplicationState, DeployableId,
    InstanceId, InstanceState, ValidationResult,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Operations accepted while an application sits in `state`
pub fn allowed_operations(state: ApplicationState) -> &'static [ApplicationOperationType] {
    use ApplicationOperationType::*;
    match state {
        ApplicationState::Monitoring => &[StartInstances, ScaleInstances, Destroy, Recover],
        ApplicationState::Running => &[
            StartInstances,
            StopInstances,
            ScaleInstances,
            ReplaceInstances,
            Suspend,
            Recover,
        ],
        ApplicationState::ScalingRequested => &[ScaleInstances],
        ApplicationState::Init
        | ApplicationState::OutageDetected
        | ApplicationState::StopInstancesRequested
        | ApplicationState::ReplaceInstancesRequested
        | ApplicationState::DestroyRequested
        | ApplicationState::Destroyed
        | ApplicationState::Failed => &[],
    }
}

pub struct ApplicationCommandValidator {
    applications: Arc<dyn ApplicationStateStore>,
    instances: Arc<dyn InstanceInfoStore>,
    cluster: Arc<dyn ClusterResourcesStore>,
    admission: AdmissionConfig,
}

impl ApplicationCommandValidator {
    pub fn new(
        applications: Arc<dyn ApplicationStateStore>,
        instances: Arc<dyn InstanceInfoStore>,
        cluster: Arc<dyn ClusterResourcesStore>,
        admission: AdmissionConfig,
    ) -> Self {
        Self {
            applications,
            instances,
            cluster,
            admission,
        }
    }

    fn validate_stop(&self, app_id: &DeployableId, instance_ids: &[InstanceId]) -> ValidationResult {
        let active: BTreeSet<InstanceId> = self
            .instances
            .active_instances(app_id)
            .into_iter()
            .map(|i| i.instance_id)
            .collect();
        let invalid: BTreeSet<&InstanceId> = instance_ids.iter().filter(|id| !active.contains(*id)).collect();
        if invalid.is_empty() {
            return ValidationResult::success();
        }
        let joined = invalid
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        ValidationResult::failure(format!(
            "App {} does not have any instances with the following ids: {}",
            app_id, joined
        ))
    }

    fn validate_replace(&self, app_id: &DeployableId, instance_ids: &BTreeSet<InstanceId>) -> ValidationResult {
        let unknown: Vec<&InstanceId> = instance_ids
            .iter()
            .filter(|id| {
                self.instances
                    .instance(app_id, id)
                    .map(|i| i.state != InstanceState::Healthy)
                    .unwrap_or(true)
            })
            .collect();
        if unknown.is_empty() {
            return ValidationResult::success();
        }
        ValidationResult::failure(format!(
            "There are no replaceable healthy instances with ids: {}",
            bracketed(&unknown)
        ))
    }

    fn validate_scale(&self, app_id: &DeployableId, required: u64) -> ValidationResult {
        let current = self.instances.instance_count(app_id, InstanceState::RUNNING_STATES) as u64;
        if required <= current {
            return ValidationResult::success();
        }
        self.ensure_resources(app_id, required - current)
    }

    fn ensure_resources(&self, app_id: &DeployableId, new_instances: u64) -> ValidationResult {
        if self.cluster.executor_count(true) == 0 {
            return ValidationResult::failure("No executors on cluster");
        }
        let Some(app) = self.applications.application(app_id) else {
            return ValidationResult::failure(format!("No spec found for app {}", app_id));
        };
        ValidationResult::from_errors(check_resources(
            self.cluster.as_ref(),
            &app.spec.resources,
            new_instances,
        ))
    }
}

impl CommandValidator<ApplicationKind> for ApplicationCommandValidator {
    fn validate_operation(
        &self,
        engine: &dyn EngineView<ApplicationState>,
        operation: &ApplicationOperation,
    ) -> ValidationResult {
        let app_id = operation.app_id();
        if app_id.is_empty() {
            return ValidationResult::failure("no app id found in operation");
        }
        let op_type = operation.op_type();
        if op_type != ApplicationOperationType::Create {
            let Some(state) = engine.current_state(&app_id) else {
                return ValidationResult::failure(format!("No state found for app: {}", app_id));
            };
            if let Some(denied) = check_allowed(&app_id, "app", state, op_type, allowed_operations(state)) {
                return denied;
            }
        }

        match operation {
            ApplicationOperation::Create { spec, .. } => {
                if engine.exists(&app_id) {
                    return ValidationResult::failure(format!("App {} already exists", app_id));
                }
                self.validate_spec(spec)
            }
            ApplicationOperation::StartInstances { instances, .. } => {
                self.ensure_resources(&app_id, *instances)
            }
            ApplicationOperation::StopInstances { instance_ids, .. } => {
                self.validate_stop(&app_id, instance_ids)
            }
            ApplicationOperation::Scale { required_instances, .. } => {
                self.validate_scale(&app_id, *required_instances)
            }
            ApplicationOperation::ReplaceInstances { instance_ids, .. } => {
                self.validate_replace(&app_id, instance_ids)
            }
            ApplicationOperation::Suspend { .. }
            | ApplicationOperation::Recover { .. }
            | ApplicationOperation::Destroy { .. } => ValidationResult::success(),
        }
    }

    fn validate_spec(&self, spec: &ApplicationSpec) -> ValidationResult {
        let mut errors = Vec::new();
        let ports = port_map(&spec.exposed_ports);
        errors.extend(validate_check_spec(spec.healthcheck.as_ref(), &ports));
        errors.extend(validate_check_spec(spec.readiness.as_ref(), &ports));
        errors.extend(check_mandatory_resources(&spec.resources));
        if let Some(exposure) = &spec.exposure_spec {
            if !ports.contains_key(exposure.port_name.as_str()) {
                let names: Vec<&str> = ports.keys().copied().collect();
                errors.push(format!(
                    "Exposed port name {} is undefined. Defined port names: {}",
                    exposure.port_name,
                    bracketed(&names)
                ));
            }
        }
        errors.extend(ensure_whitelisted_volumes(&spec.volumes, &self.admission));
        errors.extend(ensure_cmdl_args(&spec.args, &self.admission));
        errors.extend(check_device_disabled(&spec.devices, &self.admission));
        if spec.placement_policy.is_local() {
            errors.push("Local service placement is not allowed for apps".to_string());
        }
        ValidationResult::from_errors(errors)
    }
}
