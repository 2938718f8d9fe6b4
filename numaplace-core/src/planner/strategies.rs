use serde::{Deserialize, Serialize};

use crate::cpuset::CpuSet;
use crate::error::NumaResult;
use crate::placement::Placement;
use crate::request::{NodeResource, VmResourceRequest};
use crate::topology::Topology;

use super::candidates::SearchSpace;

/// How the planner chooses nodes and CPUs for a VM
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Smallest, tightest set of nodes that fits the request
    #[default]
    NumaAware,
    /// Every given node and every host CPU, ignoring locality. This is the
    /// baseline NUMA-aware plans are compared against.
    Spread,
}

impl PlacementStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            PlacementStrategy::NumaAware => "numa-aware",
            PlacementStrategy::Spread => "spread",
        }
    }
}

/// CPUs picked for a VM along with their summed distance to the VM's nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CpuChoice {
    pub cpus: CpuSet,
    pub reach: u64,
}

/// Take the `count` eligible CPUs of `positions` closest to those nodes.
///
/// A CPU's reach is the summed distance from its node to every node of
/// `positions`; lower reach wins. Ties go round-robin across the nodes in
/// position order, lowest id first on each node, so hosts with equal remote
/// distances get their vCPUs striped over every chosen node.
pub(crate) fn closest_cpus(space: &SearchSpace<'_>, positions: &[usize], count: usize) -> CpuChoice {
    let mut ranked: Vec<(u64, usize, usize, usize)> = positions
        .iter()
        .enumerate()
        .flat_map(move |(order, &p)| {
            let reach = space.reach(p, positions);
            space
                .eligible(p)
                .iter()
                .enumerate()
                .map(move |(round, cpu)| (reach, round, order, cpu))
        })
        .collect();
    ranked.sort_unstable();
    ranked.truncate(count);

    CpuChoice {
        reach: ranked.iter().map(|&(reach, ..)| reach).sum(),
        cpus: ranked.into_iter().map(|(.., cpu)| cpu).collect(),
    }
}

/// Baseline placement: all given nodes, all host CPUs
pub fn spread_placement(
    topology: &Topology,
    node_resources: &[NodeResource],
    request: &VmResourceRequest,
) -> NumaResult<Option<Placement>> {
    if node_resources.is_empty() || topology.all_cpus().is_empty() {
        return Ok(None);
    }

    let nodes = node_resources.iter().map(|r| r.node).collect();
    Placement::new(request.vcpus(), nodes, topology.all_cpus().clone()).map(Some)
}
