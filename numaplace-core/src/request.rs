//! Placement inputs: what a VM asks for and what each node has left

use serde::{Deserialize, Serialize};

use crate::cpuset::CpuSet;
use crate::error::{NumaError, NumaResult};
use crate::topology::NodeId;

/// Resources a VM asks for when it starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawVmResourceRequest")]
pub struct VmResourceRequest {
    vcpus: u32,
    memory: u64,
    affinity: CpuSet,
}

#[derive(Deserialize)]
struct RawVmResourceRequest {
    vcpus: u32,
    memory: u64,
    affinity: CpuSet,
}

impl TryFrom<RawVmResourceRequest> for VmResourceRequest {
    type Error = NumaError;

    fn try_from(raw: RawVmResourceRequest) -> Result<Self, Self::Error> {
        Self::new(raw.vcpus, raw.memory, raw.affinity)
    }
}

impl VmResourceRequest {
    /// Validate and build a request.
    ///
    /// `memory` is in bytes; `affinity` lists the physical CPUs the VM may
    /// run on.
    pub fn new(vcpus: u32, memory: u64, affinity: CpuSet) -> NumaResult<Self> {
        if vcpus == 0 {
            return Err(NumaError::invalid_input("vcpus", "a VM needs at least one vCPU"));
        }
        if affinity.is_empty() {
            return Err(NumaError::invalid_input(
                "affinity",
                "affinity mask must name at least one CPU",
            ));
        }

        Ok(Self {
            vcpus,
            memory,
            affinity,
        })
    }

    pub fn vcpus(&self) -> u32 {
        self.vcpus
    }

    /// Requested memory in bytes
    pub fn memory(&self) -> u64 {
        self.memory
    }

    pub fn affinity(&self) -> &CpuSet {
        &self.affinity
    }
}

/// Remaining memory of one NUMA node at the time of a planning call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResource {
    pub node: NodeId,
    /// Bytes still free on this node
    pub memory_available: u64,
}

impl NodeResource {
    pub fn new(node: NodeId, memory_available: u64) -> Self {
        Self {
            node,
            memory_available,
        }
    }
}
