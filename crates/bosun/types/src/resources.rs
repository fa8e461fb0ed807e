//! Resource requirements and executor resource snapshots

use crate::ids::ExecutorId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single resource requirement of a deployable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceRequirement {
    /// Number of dedicated cores
    Cpu { count: u64 },
    /// Memory in megabytes
    Memory { size_in_mb: u64 },
}

impl ResourceRequirement {
    pub fn is_cpu(&self) -> bool {
        matches!(self, ResourceRequirement::Cpu { .. })
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, ResourceRequirement::Memory { .. })
    }
}

/// Cores needed by one instance
pub fn cores_per_instance(resources: &[ResourceRequirement]) -> u64 {
    resources
        .iter()
        .map(|r| match r {
            ResourceRequirement::Cpu { count } => *count,
            ResourceRequirement::Memory { .. } => 0,
        })
        .sum()
}

/// Memory (MB) needed by one instance
pub fn memory_per_instance(resources: &[ResourceRequirement]) -> u64 {
    resources
        .iter()
        .map(|r| match r {
            ResourceRequirement::Cpu { .. } => 0,
            ResourceRequirement::Memory { size_in_mb } => *size_in_mb,
        })
        .sum()
}

/// Resources actually allocated to an instance, keyed by NUMA node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceAllocation {
    Cpu { cores: BTreeMap<u32, BTreeSet<u32>> },
    Memory { memory_in_mb: BTreeMap<u32, u64> },
}

/// Physical core layout of an executor host: NUMA node to core ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalLayout {
    pub cores: BTreeMap<u32, BTreeSet<u32>>,
}

impl PhysicalLayout {
    /// Size of the biggest core group on a single NUMA node
    pub fn max_cores_per_node(&self) -> Option<u64> {
        self.cores.values().map(|c| c.len() as u64).max()
    }
}

/// Point-in-time view of the free resources on one executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorResourceSnapshot {
    pub executor_id: ExecutorId,
    pub hostname: String,
    /// Free core ids per NUMA node
    pub free_cores: BTreeMap<u32, BTreeSet<u32>>,
    /// Free memory (MB) per NUMA node
    pub free_memory: BTreeMap<u32, u64>,
    pub layout: Option<PhysicalLayout>,
    #[serde(default)]
    pub blacklisted: bool,
}

impl ExecutorResourceSnapshot {
    pub fn total_free_cores(&self) -> u64 {
        self.free_cores.values().map(|c| c.len() as u64).sum()
    }

    pub fn total_free_memory(&self) -> u64 {
        self.free_memory.values().sum()
    }
}
