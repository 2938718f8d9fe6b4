use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cpuset::CpuSet;
use crate::error::{NumaError, NumaResult};
use crate::topology::{NodeId, Topology};

/// Where a VM runs: its vCPU count, the NUMA nodes its memory is confined
/// to, and the physical CPUs its vCPUs are bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPlacement")]
pub struct Placement {
    vcpus: u32,
    nodes: Vec<NodeId>,
    cpus: CpuSet,
}

#[derive(Deserialize)]
struct RawPlacement {
    vcpus: u32,
    nodes: Vec<NodeId>,
    cpus: CpuSet,
}

impl TryFrom<RawPlacement> for Placement {
    type Error = NumaError;

    fn try_from(raw: RawPlacement) -> Result<Self, Self::Error> {
        Self::new(raw.vcpus, raw.nodes, raw.cpus)
    }
}

impl Placement {
    pub fn new(vcpus: u32, nodes: Vec<NodeId>, cpus: CpuSet) -> NumaResult<Self> {
        if vcpus == 0 {
            return Err(NumaError::invalid_input("vcpus", "a placement needs at least one vCPU"));
        }
        if nodes.is_empty() {
            return Err(NumaError::invalid_input("nodes", "a placement needs at least one node"));
        }
        if cpus.is_empty() {
            return Err(NumaError::invalid_input("cpus", "a placement needs at least one CPU"));
        }
        for (i, node) in nodes.iter().enumerate() {
            if nodes[..i].contains(node) {
                return Err(NumaError::invalid_input(
                    "nodes",
                    format!("{} is listed twice", node),
                ));
            }
        }

        Ok(Self { vcpus, nodes, cpus })
    }

    pub fn vcpus(&self) -> u32 {
        self.vcpus
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn cpus(&self) -> &CpuSet {
        &self.cpus
    }

    /// vCPUs per physical CPU; above 1.0 the VM oversubscribes its own CPUs
    pub fn intensity(&self) -> f64 {
        self.vcpus as f64 / self.cpus.len() as f64
    }

    /// Share of this placement's CPUs whose traffic crosses the interconnect,
    /// assuming accesses are striped evenly over its nodes
    pub fn remote_traffic(&self) -> f64 {
        let spanned = self.nodes.len() as f64;
        (spanned - 1.0) / spanned * self.cpus.len() as f64
    }

    /// Reject nodes or CPUs that `topology` does not have
    pub fn check_against(&self, topology: &Topology) -> NumaResult<()> {
        for node in &self.nodes {
            topology.check_node(*node)?;
        }
        for cpu in &self.cpus {
            if topology.node_of_cpu(cpu).is_none() {
                return Err(NumaError::InvalidCpu {
                    cpu,
                    available: topology.cpu_count(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes: Vec<String> = self.nodes.iter().map(|n| n.to_string()).collect();
        write!(
            f,
            "{} vcpus on cpus [{}] nodes [{}]",
            self.vcpus,
            self.cpus,
            nodes.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates() {
        let cpus = CpuSet::with_range(0, 2);
        assert!(Placement::new(0, vec![NodeId::new(0)], cpus.clone()).is_err());
        assert!(Placement::new(1, Vec::new(), cpus.clone()).is_err());
        assert!(Placement::new(1, vec![NodeId::new(0)], CpuSet::new()).is_err());
        assert!(Placement::new(1, vec![NodeId::new(0), NodeId::new(0)], cpus.clone()).is_err());
        assert!(Placement::new(1, vec![NodeId::new(0)], cpus).is_ok());
    }

    #[test]
    fn test_intensity_and_remote_traffic() {
        let p = Placement::new(
            3,
            vec![NodeId::new(0), NodeId::new(1), NodeId::new(2), NodeId::new(3)],
            CpuSet::with_range(0, 6),
        )
        .unwrap();
        assert_eq!(p.intensity(), 0.5);
        assert_eq!(p.remote_traffic(), 4.5);

        let local = Placement::new(2, vec![NodeId::new(0)], CpuSet::with_range(0, 2)).unwrap();
        assert_eq!(local.remote_traffic(), 0.0);
    }

    #[test]
    fn test_check_against() {
        let topo = Topology::uniform(2, 2, 21).unwrap();
        let bad_cpu = Placement::new(1, vec![NodeId::new(0)], CpuSet::singleton(7)).unwrap();
        assert!(matches!(
            bad_cpu.check_against(&topo),
            Err(NumaError::InvalidCpu { cpu: 7, .. })
        ));
        let bad_node = Placement::new(1, vec![NodeId::new(5)], CpuSet::singleton(0)).unwrap();
        assert!(matches!(
            bad_node.check_against(&topo),
            Err(NumaError::InvalidNode { node: 5, .. })
        ));
    }
}
