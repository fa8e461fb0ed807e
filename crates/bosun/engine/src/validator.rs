//! Admission control shared by the lifecycle engines
//!
//! A [`CommandValidator`] gates every operation against the current state
//! of its entity and, for operations that add instances, against the free
//! capacity of the cluster. Failures are values, never errors: the caller
//! gets a [`ValidationResult`] with every reason that applies.

use crate::config::AdmissionConfig;
use crate::lifecycle::{DeployableKind, KindState};
use bosun_statestore::ClusterResourcesStore;
use bosun_types::{
    cores_per_instance, memory_per_instance, CheckMode, CheckSpec, DeployableId, DeviceSpec,
    MountedVolume, PortSpec, ResourceRequirement, ValidationResult,
};
use std::collections::BTreeMap;
use std::fmt::Display;

/// What a validator may ask the engine it guards
pub trait EngineView<S> {
    /// Whether an actor is registered for `id`
    fn exists(&self, id: &DeployableId) -> bool;

    fn current_state(&self, id: &DeployableId) -> Option<S>;
}

/// Per-kind admission control
pub trait CommandValidator<K: DeployableKind>: Send + Sync {
    fn validate_operation(
        &self,
        engine: &dyn EngineView<KindState<K>>,
        operation: &K::Operation,
    ) -> ValidationResult;

    fn validate_spec(&self, spec: &K::Spec) -> ValidationResult;
}

/// Outcome of checking an operation type against the allowed set for a state
pub(crate) fn check_allowed<S: Display, T: Ord + Copy + Display>(
    id: &DeployableId,
    kind_label: &str,
    state: S,
    op_type: T,
    allowed: &[T],
) -> Option<ValidationResult> {
    if allowed.contains(&op_type) {
        return None;
    }
    if allowed.is_empty() {
        return Some(ValidationResult::failure(format!(
            "No operations allowed for {} as it is in {} state",
            id, state
        )));
    }
    let mut sorted = allowed.to_vec();
    sorted.sort_by_key(|t| t.to_string());
    Some(ValidationResult::failure(format!(
        "Only {} allowed for {} {} as it is in {} state",
        bracketed(&sorted),
        kind_label,
        id,
        state
    )))
}

/// `[a, b]` rendering used in admission messages
pub(crate) fn bracketed<T: Display>(items: &[T]) -> String {
    let joined = items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", joined)
}

pub(crate) fn port_map(ports: &[PortSpec]) -> BTreeMap<&str, &PortSpec> {
    ports.iter().map(|p| (p.name.as_str(), p)).collect()
}

/// HTTP checks must reference a declared port
pub(crate) fn validate_check_spec(
    check: Option<&CheckSpec>,
    ports: &BTreeMap<&str, &PortSpec>,
) -> Option<String> {
    match check.map(|c| &c.mode) {
        Some(CheckMode::Http { port_name, .. }) if !ports.contains_key(port_name.as_str()) => {
            let names: Vec<&str> = ports.keys().copied().collect();
            Some(format!(
                "Invalid port name for health check: {}. Available ports: {}",
                port_name,
                bracketed(&names)
            ))
        }
        _ => None,
    }
}

pub(crate) fn check_mandatory_resources(resources: &[ResourceRequirement]) -> Vec<String> {
    let mut errors = Vec::new();
    if !resources.iter().any(ResourceRequirement::is_cpu) {
        errors.push("Cpu requirements are mandatory".to_string());
    }
    if !resources.iter().any(ResourceRequirement::is_memory) {
        errors.push("Memory requirements are mandatory".to_string());
    }
    errors
}

/// Host paths must sit under an allowed directory when an allow-list is set
pub(crate) fn ensure_whitelisted_volumes(
    volumes: &[MountedVolume],
    admission: &AdmissionConfig,
) -> Vec<String> {
    if admission.allowed_mount_dirs.is_empty() {
        return Vec::new();
    }
    volumes
        .iter()
        .filter(|volume| {
            !admission
                .allowed_mount_dirs
                .iter()
                .any(|dir| volume.path_on_host.starts_with(dir.as_str()))
        })
        .map(|volume| {
            format!(
                "Volume mount requested on non whitelisted host directory: {}",
                volume.path_on_host
            )
        })
        .collect()
}

pub(crate) fn ensure_cmdl_args(args: &[String], admission: &AdmissionConfig) -> Vec<String> {
    if admission.disable_cmdl_args && !args.is_empty() {
        return vec!["Passing command line to containers is disabled on this cluster".to_string()];
    }
    if args.join(" ").len() > admission.max_cmdl_args_length {
        return vec![format!(
            "Maximum combined length of command line arguments can be {}",
            admission.max_cmdl_args_length
        )];
    }
    Vec::new()
}

pub(crate) fn check_device_disabled(devices: &[DeviceSpec], admission: &AdmissionConfig) -> Vec<String> {
    if !admission.enable_raw_device_access && !devices.is_empty() {
        return vec![
            "Device access is disabled. To enable, set enable_raw_device_access: true in controller options."
                .to_string(),
        ];
    }
    Vec::new()
}

/// Cluster-wide capacity check for `instances` new instances
///
/// Free cores and memory are summed over every executor, blacklisted ones
/// included. CPU and memory shortfalls are reported independently. A single
/// instance may never need more cores than the biggest NUMA node offers.
pub(crate) fn check_resources(
    cluster: &dyn ClusterResourcesStore,
    resources: &[ResourceRequirement],
    instances: u64,
) -> Vec<String> {
    let executors = cluster.current_snapshot(true);
    let free_cores: u64 = executors.iter().map(|e| e.total_free_cores()).sum();
    let free_memory: u64 = executors.iter().map(|e| e.total_free_memory()).sum();

    let cores_per_instance = cores_per_instance(resources);
    let required_cores = instances.saturating_mul(cores_per_instance);
    let required_memory = instances.saturating_mul(memory_per_instance(resources));

    let mut errors = Vec::new();
    if required_cores > free_cores {
        errors.push(format!(
            "Cluster does not have enough CPU. Required: {} Available: {}",
            required_cores, free_cores
        ));
    }
    if required_memory > free_memory {
        errors.push(format!(
            "Cluster does not have enough Memory. Required: {} Available: {}",
            required_memory, free_memory
        ));
    }

    let max_cores_per_node = executors
        .iter()
        .filter_map(|e| e.layout.as_ref())
        .filter_map(|layout| layout.max_cores_per_node())
        .max();
    if let Some(max) = max_cores_per_node {
        if max < cores_per_instance {
            errors.push(format!(
                "Required cores exceeds the maximum core available on a single NUMA node in the cluster. Required: {} Max: {}",
                cores_per_instance, max
            ));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosun_statestore::InMemoryClusterResources;
    use bosun_types::{ExecutorId, ExecutorResourceSnapshot, MountMode, PhysicalLayout};
    use std::collections::BTreeSet;

    fn executor(id: &str, cores: &[u32], memory: u64, layout_cores: &[u32]) -> ExecutorResourceSnapshot {
        ExecutorResourceSnapshot {
            executor_id: ExecutorId::new(id),
            hostname: format!("{}.local", id),
            free_cores: BTreeMap::from([(0, cores.iter().copied().collect::<BTreeSet<_>>())]),
            free_memory: BTreeMap::from([(0, memory)]),
            layout: Some(PhysicalLayout {
                cores: BTreeMap::from([(0, layout_cores.iter().copied().collect())]),
            }),
            blacklisted: false,
        }
    }

    fn per_instance(cores: u64, memory: u64) -> Vec<ResourceRequirement> {
        vec![
            ResourceRequirement::Cpu { count: cores },
            ResourceRequirement::Memory { size_in_mb: memory },
        ]
    }

    #[test]
    fn test_capacity_shortfall_reports_both() {
        let cluster = InMemoryClusterResources::new();
        cluster.add_executor(executor("e1", &[1, 2], 4096, &[0, 1, 2, 3]));
        let mut blacklisted = executor("e2", &[5], 4352, &[4, 5, 6, 7]);
        blacklisted.blacklisted = true;
        cluster.add_executor(blacklisted);

        let errors = check_resources(&cluster, &per_instance(1, 512), 100);
        assert_eq!(
            errors,
            vec![
                "Cluster does not have enough CPU. Required: 100 Available: 3".to_string(),
                "Cluster does not have enough Memory. Required: 51200 Available: 8448".to_string(),
            ]
        );
    }

    #[test]
    fn test_numa_ceiling() {
        let cluster = InMemoryClusterResources::new();
        cluster.add_executor(executor("e1", &[0, 1, 2, 3, 4], 8192, &[0, 1, 2, 3, 4]));
        cluster.add_executor(executor("e2", &[10, 11, 12, 13, 14], 8192, &[10, 11, 12, 13, 14]));

        let errors = check_resources(&cluster, &per_instance(6, 512), 1);
        assert_eq!(
            errors,
            vec![
                "Required cores exceeds the maximum core available on a single NUMA node in the cluster. Required: 6 Max: 5"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_no_layout_means_no_ceiling() {
        let cluster = InMemoryClusterResources::new();
        let mut snapshot = executor("e1", &[0, 1, 2, 3, 4, 5, 6, 7], 8192, &[]);
        snapshot.layout = None;
        cluster.add_executor(snapshot);

        assert!(check_resources(&cluster, &per_instance(8, 512), 1).is_empty());
    }

    #[test]
    fn test_volume_allow_list() {
        let volume = |path: &str| MountedVolume {
            path_in_container: "/data".to_string(),
            path_on_host: path.to_string(),
            mode: MountMode::ReadOnly,
        };
        let volumes = vec![volume("/var/data/a"), volume("/etc/secrets")];

        assert!(ensure_whitelisted_volumes(&volumes, &AdmissionConfig::default()).is_empty());

        let admission = AdmissionConfig {
            allowed_mount_dirs: vec!["/var/data".to_string()],
            ..Default::default()
        };
        assert_eq!(
            ensure_whitelisted_volumes(&volumes, &admission),
            vec!["Volume mount requested on non whitelisted host directory: /etc/secrets".to_string()]
        );
    }

    #[test]
    fn test_cmdl_args() {
        let mut admission = AdmissionConfig::default();
        assert!(ensure_cmdl_args(&["--flag".to_string()], &admission).is_empty());

        let long = vec!["x".repeat(1024), "y".repeat(1024)];
        assert_eq!(
            ensure_cmdl_args(&long, &admission),
            vec!["Maximum combined length of command line arguments can be 2048".to_string()]
        );

        admission.disable_cmdl_args = true;
        assert_eq!(
            ensure_cmdl_args(&["--flag".to_string()], &admission),
            vec!["Passing command line to containers is disabled on this cluster".to_string()]
        );
        assert!(ensure_cmdl_args(&[], &admission).is_empty());
    }

    #[test]
    fn test_check_spec_port_reference() {
        let ports = vec![PortSpec::http("main", 8080)];
        let ports = port_map(&ports);
        assert!(validate_check_spec(Some(&CheckSpec::http("main", "/")), &ports).is_none());
        assert!(validate_check_spec(None, &ports).is_none());
        assert_eq!(
            validate_check_spec(Some(&CheckSpec::http("admin", "/")), &ports).as_deref(),
            Some("Invalid port name for health check: admin. Available ports: [main]")
        );
    }

    #[test]
    fn test_state_gate_messages() {
        let id = DeployableId::new("app-1");
        assert!(check_allowed(&id, "app", "RUNNING", "SCALE", &["SCALE", "DESTROY"]).is_none());

        let denied = check_allowed(&id, "app", "RUNNING", "CREATE", &["SCALE", "DESTROY"]).unwrap();
        assert_eq!(
            denied.messages,
            vec!["Only [DESTROY, SCALE] allowed for app app-1 as it is in RUNNING state".to_string()]
        );

        let none: [&str; 0] = [];
        let denied = check_allowed(&id, "app", "FAILED", "SCALE", &none).unwrap();
        assert_eq!(
            denied.messages,
            vec!["No operations allowed for app-1 as it is in FAILED state".to_string()]
        );
    }
}
