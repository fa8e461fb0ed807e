//! Admission control for local services

use super::LocalServiceKind;
use crate::config::AdmissionConfig;
use crate::validator::{
    bracketed, check_allowed, check_device_disabled, check_mandatory_resources, ensure_cmdl_args,
    ensure_whitelisted_volumes, port_map, validate_check_spec, CommandValidator, EngineView,
};
use bosun_statestore::LocalServiceStateStore;
use bosun_types::{
    DeployableId, InstanceId, InstanceState, LocalServiceOperation, LocalServiceOperationType,
    LocalServiceSpec, LocalServiceState, ValidationResult,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Operations accepted while a local service sits in `state`
pub fn allowed_operations(state: LocalServiceState) -> &'static [LocalServiceOperationType] {
    use LocalServiceOperationType::*;
    match state {
        LocalServiceState::EmergencyDeactivationRequested => &[Deactivate],
        LocalServiceState::Inactive => &[
            Activate,
            DeployTestInstance,
            AdjustInstances,
            Destroy,
            UpdateInstanceCount,
        ],
        LocalServiceState::ConfigTesting => &[
            Activate,
            Deactivate,
            AdjustInstances,
            ReplaceInstances,
            Restart,
            StopInstances,
        ],
        LocalServiceState::Active => &[
            Deactivate,
            UpdateInstanceCount,
            AdjustInstances,
            ReplaceInstances,
            Restart,
            StopInstances,
        ],
        LocalServiceState::Init
        | LocalServiceState::ActivationRequested
        | LocalServiceState::ConfigTestingRequested
        | LocalServiceState::DestroyRequested
        | LocalServiceState::DeactivationRequested
        | LocalServiceState::UpdatingInstancesCount
        | LocalServiceState::AdjustingInstances
        | LocalServiceState::ReplacingInstances
        | LocalServiceState::StoppingInstances
        | LocalServiceState::Destroyed => &[],
    }
}

pub struct LocalServiceCommandValidator {
    services: Arc<dyn LocalServiceStateStore>,
    admission: AdmissionConfig,
}

impl LocalServiceCommandValidator {
    pub fn new(services: Arc<dyn LocalServiceStateStore>, admission: AdmissionConfig) -> Self {
        Self { services, admission }
    }

    /// Ids in `instance_ids` that do not name a healthy instance
    fn unhealthy_ids<'a>(&self, service_id: &DeployableId, instance_ids: &'a BTreeSet<InstanceId>) -> Vec<&'a InstanceId> {
        instance_ids
            .iter()
            .filter(|id| {
                self.services
                    .instance(service_id, id)
                    .map(|i| i.state != InstanceState::Healthy)
                    .unwrap_or(true)
            })
            .collect()
    }

    fn validate_instance_count_update(&self, service_id: &DeployableId) -> ValidationResult {
        match self.services.service(service_id) {
            Some(service) if !service.spec.placement_policy.is_host_level() => ValidationResult::success(),
            _ => ValidationResult::failure(
                "Update is allowed for services that do not have Host Level option set",
            ),
        }
    }
}

impl CommandValidator<LocalServiceKind> for LocalServiceCommandValidator {
    fn validate_operation(
        &self,
        engine: &dyn EngineView<LocalServiceState>,
        operation: &LocalServiceOperation,
    ) -> ValidationResult {
        let service_id = operation.service_id();
        if service_id.is_empty() {
            return ValidationResult::failure("No local service id found in operation");
        }
        let op_type = operation.op_type();
        if op_type != LocalServiceOperationType::Create {
            let Some(state) = engine.current_state(&service_id) else {
                return ValidationResult::failure(format!("No state found for local service: {}", service_id));
            };
            if let Some(denied) = check_allowed(&service_id, "local service", state, op_type, allowed_operations(state)) {
                return denied;
            }
        }

        match operation {
            LocalServiceOperation::Create { spec, .. } => {
                if engine.exists(&service_id) {
                    return ValidationResult::failure(format!("Local service {} already exists", service_id));
                }
                self.validate_spec(spec)
            }
            LocalServiceOperation::UpdateInstanceCount { .. } => self.validate_instance_count_update(&service_id),
            LocalServiceOperation::ReplaceInstances { instance_ids, .. } => {
                let unknown = self.unhealthy_ids(&service_id, instance_ids);
                if unknown.is_empty() {
                    ValidationResult::success()
                } else {
                    ValidationResult::failure(format!(
                        "There are no replaceable healthy instances with ids: {}",
                        bracketed(&unknown)
                    ))
                }
            }
            LocalServiceOperation::StopInstances { instance_ids, .. } => {
                let unknown = self.unhealthy_ids(&service_id, instance_ids);
                if unknown.is_empty() {
                    ValidationResult::success()
                } else {
                    ValidationResult::failure(format!(
                        "There are no healthy instances with ids: {}",
                        bracketed(&unknown)
                    ))
                }
            }
            LocalServiceOperation::Activate { .. }
            | LocalServiceOperation::Deactivate { .. }
            | LocalServiceOperation::DeployTestInstance { .. }
            | LocalServiceOperation::AdjustInstances { .. }
            | LocalServiceOperation::Restart { .. }
            | LocalServiceOperation::Destroy { .. } => ValidationResult::success(),
        }
    }

    fn validate_spec(&self, spec: &LocalServiceSpec) -> ValidationResult {
        let mut errors = Vec::new();
        let ports = port_map(&spec.exposed_ports);
        errors.extend(validate_check_spec(spec.healthcheck.as_ref(), &ports));
        errors.extend(validate_check_spec(spec.readiness.as_ref(), &ports));
        errors.extend(check_mandatory_resources(&spec.resources));
        errors.extend(ensure_whitelisted_volumes(&spec.volumes, &self.admission));
        errors.extend(ensure_cmdl_args(&spec.args, &self.admission));
        errors.extend(check_device_disabled(&spec.devices, &self.admission));
        if !spec.placement_policy.is_local() {
            errors.push("Only local placement is allowed for local services".to_string());
        }
        ValidationResult::from_errors(errors)
    }
}
