//! User-submitted deployable definitions
//!
//! Specs are immutable once submitted. Identity of applications and local
//! services is derived from `name` and `version`.

use crate::ids::DeployableId;
use crate::resources::ResourceRequirement;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Container image to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executable {
    pub image: String,
    #[serde(default)]
    pub pull_timeout_ms: Option<u64>,
}

impl Executable {
    pub fn docker(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            pull_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortType {
    Http,
    Https,
    Tcp,
    Udp,
}

/// A named port exposed by the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub port: u16,
    pub port_type: PortType,
}

impl PortSpec {
    pub fn http(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            port_type: PortType::Http,
        }
    }
}

/// How a health or readiness check is performed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckMode {
    Http {
        port_name: String,
        path: String,
        #[serde(default)]
        success_codes: Vec<u16>,
    },
    Cmd {
        command: String,
    },
}

/// Health or readiness check definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub mode: CheckMode,
    pub timeout_ms: u64,
    pub interval_ms: u64,
    pub attempts: u32,
    #[serde(default)]
    pub initial_delay_ms: u64,
}

impl CheckSpec {
    pub fn http(port_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            mode: CheckMode::Http {
                port_name: port_name.into(),
                path: path.into(),
                success_codes: vec![200],
            },
            timeout_ms: 1_000,
            interval_ms: 3_000,
            attempts: 3,
            initial_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExposureMode {
    All,
}

/// Service discovery exposure of one named port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureSpec {
    pub vhost: String,
    pub port_name: String,
    pub mode: ExposureMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MountMode {
    ReadWrite,
    ReadOnly,
}

/// Host directory mounted into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountedVolume {
    pub path_in_container: String,
    pub path_on_host: String,
    pub mode: MountMode,
}

/// Raw host device passed to the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub path_on_host: String,
    #[serde(default)]
    pub path_in_container: Option<String>,
}

/// Where instances may be placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementPolicy {
    Any,
    OnePerHost,
    MaxNPerHost { max: u32 },
    MatchTag { tag: String },
    NoTag,
    /// Instances pinned to every executor; used by local services
    Local { host_level: bool },
}

impl PlacementPolicy {
    pub fn is_local(&self) -> bool {
        matches!(self, PlacementPolicy::Local { .. })
    }

    pub fn is_host_level(&self) -> bool {
        matches!(self, PlacementPolicy::Local { host_level: true })
    }
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        PlacementPolicy::Any
    }
}

/// Long-running, horizontally scaled workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub name: String,
    pub version: String,
    pub executable: Executable,
    #[serde(default)]
    pub exposed_ports: Vec<PortSpec>,
    #[serde(default)]
    pub volumes: Vec<MountedVolume>,
    pub resources: Vec<ResourceRequirement>,
    #[serde(default)]
    pub placement_policy: PlacementPolicy,
    pub healthcheck: Option<CheckSpec>,
    pub readiness: Option<CheckSpec>,
    #[serde(default)]
    pub exposure_spec: Option<ExposureSpec>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl ApplicationSpec {
    /// Minimal spec with no resources, ports or checks
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        executable: Executable,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            executable,
            exposed_ports: Vec::new(),
            volumes: Vec::new(),
            resources: Vec::new(),
            placement_policy: PlacementPolicy::Any,
            healthcheck: None,
            readiness: None,
            exposure_spec: None,
            args: Vec::new(),
            devices: Vec::new(),
            env: HashMap::new(),
            tags: HashMap::new(),
        }
    }

    pub fn with_resources(mut self, cores: u64, memory_in_mb: u64) -> Self {
        self.resources = vec![
            ResourceRequirement::Cpu { count: cores },
            ResourceRequirement::Memory {
                size_in_mb: memory_in_mb,
            },
        ];
        self
    }

    pub fn id(&self) -> DeployableId {
        DeployableId::from_name_version(&self.name, &self.version)
    }
}

/// Per-host service; one or more instances on every executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalServiceSpec {
    pub name: String,
    pub version: String,
    pub executable: Executable,
    #[serde(default)]
    pub exposed_ports: Vec<PortSpec>,
    #[serde(default)]
    pub volumes: Vec<MountedVolume>,
    pub resources: Vec<ResourceRequirement>,
    pub placement_policy: PlacementPolicy,
    pub healthcheck: Option<CheckSpec>,
    pub readiness: Option<CheckSpec>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl LocalServiceSpec {
    /// Minimal spec placed locally, not host level
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        executable: Executable,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            executable,
            exposed_ports: Vec::new(),
            volumes: Vec::new(),
            resources: Vec::new(),
            placement_policy: PlacementPolicy::Local { host_level: false },
            healthcheck: None,
            readiness: None,
            args: Vec::new(),
            devices: Vec::new(),
            env: HashMap::new(),
            tags: HashMap::new(),
        }
    }

    pub fn with_resources(mut self, cores: u64, memory_in_mb: u64) -> Self {
        self.resources = vec![
            ResourceRequirement::Cpu { count: cores },
            ResourceRequirement::Memory {
                size_in_mb: memory_in_mb,
            },
        ];
        self
    }

    pub fn id(&self) -> DeployableId {
        DeployableId::from_name_version(&self.name, &self.version)
    }
}

/// One-shot batch task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub source_app_name: String,
    pub task_id: String,
    pub executable: Executable,
    #[serde(default)]
    pub volumes: Vec<MountedVolume>,
    pub resources: Vec<ResourceRequirement>,
    #[serde(default)]
    pub placement_policy: PlacementPolicy,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl TaskSpec {
    pub fn new(
        source_app_name: impl Into<String>,
        task_id: impl Into<String>,
        executable: Executable,
    ) -> Self {
        Self {
            source_app_name: source_app_name.into(),
            task_id: task_id.into(),
            executable,
            volumes: Vec::new(),
            resources: Vec::new(),
            placement_policy: PlacementPolicy::Any,
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_resources(mut self, cores: u64, memory_in_mb: u64) -> Self {
        self.resources = vec![
            ResourceRequirement::Cpu { count: cores },
            ResourceRequirement::Memory {
                size_in_mb: memory_in_mb,
            },
        ];
        self
    }
}
