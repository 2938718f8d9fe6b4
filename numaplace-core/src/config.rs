//! Planner and host configuration with TOML support
//!
//! A host file describes the construction inputs of a [`Topology`] plus the
//! memory currently free on each node, and optionally planner tuning.
//!
//! # Example Configuration
//!
//! ```toml
//! distances = [
//!     [10, 21],
//!     [21, 10],
//! ]
//!
//! [[nodes]]
//! cpus = "0-3"
//! memory_mb = 16384
//!
//! [[nodes]]
//! cpus = "4-7"
//! memory_mb = 16384
//!
//! [planner]
//! max_exhaustive_nodes = 16
//! interconnect_bandwidth_ratio = 0.5
//! memory_spread = "even"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::cpuset::CpuSet;
use crate::error::{NumaError, NumaResult};
use crate::evaluator::INTERCONNECT_BANDWIDTH_RATIO;
use crate::ledger::MemorySpread;
use crate::request::{NodeResource, VmResourceRequest};
use crate::topology::{NodeId, Topology};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Planner tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Hosts with more candidate nodes than this use the greedy search
    pub max_exhaustive_nodes: usize,

    /// Interconnect throughput relative to local memory
    pub interconnect_bandwidth_ratio: f64,

    /// How a placed VM's memory is split over its nodes
    pub memory_spread: MemorySpread,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_exhaustive_nodes: 16,
            interconnect_bandwidth_ratio: INTERCONNECT_BANDWIDTH_RATIO,
            memory_spread: MemorySpread::Even,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> NumaResult<()> {
        if self.max_exhaustive_nodes == 0 {
            return Err(NumaError::ConfigError(
                "planner.max_exhaustive_nodes must be at least 1".to_string(),
            ));
        }
        let ratio = self.interconnect_bandwidth_ratio;
        if !ratio.is_finite() || ratio < 0.0 {
            return Err(NumaError::ConfigError(format!(
                "planner.interconnect_bandwidth_ratio must be a non-negative number, got {}",
                ratio
            )));
        }
        Ok(())
    }
}

/// One NUMA node in a host file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// CPUs on this node, cpulist syntax
    pub cpus: CpuSet,

    /// Free memory in MiB
    #[serde(default)]
    pub memory_mb: u64,
}

/// Host description loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    pub distances: Vec<Vec<u32>>,
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub planner: PlannerConfig,
}

/// Everything needed to start planning on a host
#[derive(Debug, Clone)]
pub struct HostParts {
    pub topology: Topology,
    pub node_resources: Vec<NodeResource>,
    pub planner: PlannerConfig,
}

impl HostConfig {
    pub fn load(path: impl AsRef<Path>) -> NumaResult<Self> {
        let path = path.as_ref();
        debug!("Loading host configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> NumaResult<Self> {
        let config: HostConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> NumaResult<()> {
        if self.nodes.len() != self.distances.len() {
            return Err(NumaError::ConfigError(format!(
                "{} nodes declared but the distance matrix has {} rows",
                self.nodes.len(),
                self.distances.len()
            )));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            memory_bytes(node.memory_mb).map_err(|_| {
                NumaError::ConfigError(format!("nodes[{}].memory_mb is too large", index))
            })?;
        }
        self.planner.validate()
    }

    pub fn into_parts(self) -> NumaResult<HostParts> {
        self.validate()?;

        let node_resources = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| Ok(NodeResource::new(NodeId::new(index), memory_bytes(node.memory_mb)?)))
            .collect::<NumaResult<Vec<_>>>()?;
        let node_cpus = self.nodes.into_iter().map(|node| node.cpus).collect();
        let topology = Topology::from_node_cpus(self.distances, node_cpus)?;

        Ok(HostParts {
            topology,
            node_resources,
            planner: self.planner,
        })
    }
}

/// A VM request as written in a file or on the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRequestConfig {
    pub vcpus: u32,
    #[serde(default)]
    pub memory_mb: u64,
    /// Eligible CPUs; every host CPU when omitted
    #[serde(default)]
    pub affinity: Option<CpuSet>,
}

impl VmRequestConfig {
    pub fn to_request(&self, topology: &Topology) -> NumaResult<VmResourceRequest> {
        let affinity = self
            .affinity
            .clone()
            .unwrap_or_else(|| topology.all_cpus().clone());
        VmResourceRequest::new(self.vcpus, memory_bytes(self.memory_mb)?, affinity)
    }
}

/// MiB to bytes
pub fn memory_bytes(memory_mb: u64) -> NumaResult<u64> {
    memory_mb.checked_mul(BYTES_PER_MB).ok_or_else(|| {
        NumaError::ConfigError(format!("{} MiB does not fit in a byte count", memory_mb))
    })
}
