//! Memory access cost model
//!
//! Scores a placement against every other VM placed on the same host. For each
//! physical CPU of the evaluated VM we look at the distances from that CPU's
//! node to every node the VM's memory is confined to, and at how much memory
//! bandwidth the VM can expect given:
//!
//! - CPU oversubscription: placements sharing a CPU split it in proportion to
//!   their vCPU-per-CPU intensity;
//! - local bandwidth: shared by every busy CPU on the node, and only `1/N` of
//!   the VM's accesses target any one of its `N` nodes;
//! - remote bandwidth: the interconnect is shared by all cross-node traffic
//!   on the host and carries a fraction of local throughput.
//!
//! Per-CPU costs are reduced with [`AccessCost::reduce`], then `average` is
//! divided by the CPU count and `bandwidth` scaled by the VM's intensity so
//! that VMs of different sizes are comparable.

use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::cost::AccessCost;
use crate::cpuset::CpuSet;
use crate::error::{NumaError, NumaResult};
use crate::placement::Placement;
use crate::topology::{NodeId, Topology};

/// Interconnect throughput relative to local memory access
pub const INTERCONNECT_BANDWIDTH_RATIO: f64 = 0.5;

const SLICE_TOLERANCE: f64 = 1e-9;

/// Cost of `this` given the concurrently placed `others`.
///
/// `others` must not contain `this`; its own contention is accounted for
/// internally.
pub fn evaluate(topology: &Topology, others: &[Placement], this: &Placement) -> NumaResult<AccessCost> {
    evaluate_with_ratio(topology, others, this, INTERCONNECT_BANDWIDTH_RATIO)
}

/// [`evaluate`] with an explicit interconnect-to-local bandwidth ratio
#[instrument(skip_all, fields(vcpus = this.vcpus(), cpus = this.cpus().len(), nodes = this.nodes().len(), others = others.len()))]
pub fn evaluate_with_ratio(
    topology: &Topology,
    others: &[Placement],
    this: &Placement,
    interconnect_ratio: f64,
) -> NumaResult<AccessCost> {
    this.check_against(topology)?;
    for other in others {
        other.check_against(topology)?;
    }

    let cpu_count = this.cpus().len();
    if cpu_count == 0 {
        return Err(NumaError::invariant("evaluate", "evaluated placement has no CPUs"));
    }

    let contention = Contention::collect(topology, others, this);
    let spanned = this.nodes().len() as f64;
    let own_intensity = this.intensity();
    let own_remote = (spanned - 1.0) / spanned;

    let mut per_cpu = Vec::with_capacity(cpu_count);
    for cpu in this.cpus() {
        let Some(cpu_node) = topology.node_of_cpu(cpu) else {
            return Err(NumaError::InvalidCpu {
                cpu,
                available: topology.cpu_count(),
            });
        };

        let (worst, best, total) = this.nodes().iter().fold(
            (u32::MIN, u32::MAX, 0u64),
            |(worst, best, total), node| {
                let d = topology.distance(cpu_node, *node);
                (worst.max(d), best.min(d), total + u64::from(d))
            },
        );
        let average = total as f64 / spanned;

        let sharing = contention.cpu_demand(cpu);
        if sharing <= 0.0 {
            return Err(NumaError::invariant(
                "evaluate",
                format!("no CPU demand accounted on cpu {}", cpu),
            ));
        }
        let cpu_slice = own_intensity / sharing;
        if cpu_slice > 1.0 + SLICE_TOLERANCE {
            return Err(NumaError::invariant(
                "evaluate",
                format!("cpu {} slice {:.6} exceeds 1", cpu, cpu_slice),
            ));
        }

        let busy = contention.busy_on(cpu_node);
        if busy == 0 {
            return Err(NumaError::invariant(
                "evaluate",
                format!("no busy CPUs recorded on {}", cpu_node),
            ));
        }
        let local_share = 1.0 / busy as f64 / spanned;

        let remote_share = if this.nodes().len() == 1 {
            0.0
        } else if contention.remote_total <= 0.0 {
            return Err(NumaError::invariant(
                "evaluate",
                "zero interconnect traffic for a multi-node placement",
            ));
        } else {
            own_remote / contention.remote_total
        };

        let bandwidth = cpu_slice * (local_share + remote_share * interconnect_ratio);
        per_cpu.push(AccessCost::new(worst, average, bandwidth, best));
    }

    let mut cost = AccessCost::reduce(per_cpu);
    cost.average /= cpu_count as f64;
    cost.bandwidth *= own_intensity;

    debug!(%cost, "evaluated placement");
    Ok(cost)
}

/// Evaluate every placement against all the others
pub fn evaluate_each(topology: &Topology, placements: &[Placement]) -> NumaResult<Vec<AccessCost>> {
    evaluate_each_with_ratio(topology, placements, INTERCONNECT_BANDWIDTH_RATIO)
}

/// [`evaluate_each`] with an explicit interconnect-to-local bandwidth ratio
pub fn evaluate_each_with_ratio(
    topology: &Topology,
    placements: &[Placement],
    interconnect_ratio: f64,
) -> NumaResult<Vec<AccessCost>> {
    let mut others = Vec::with_capacity(placements.len().saturating_sub(1));
    let mut costs = Vec::with_capacity(placements.len());

    for (index, placement) in placements.iter().enumerate() {
        others.clear();
        others.extend(
            placements
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, p)| p.clone()),
        );
        costs.push(evaluate_with_ratio(topology, &others, placement, interconnect_ratio)?);
    }

    Ok(costs)
}

/// Fleet-wide cost: the reduction of every VM's cost
pub fn evaluate_fleet(topology: &Topology, placements: &[Placement]) -> NumaResult<AccessCost> {
    Ok(AccessCost::reduce(evaluate_each(topology, placements)?))
}

/// Host-wide contention shared by all placements, including the evaluated one
struct Contention {
    cpu_demand: HashMap<usize, f64>,
    busy_per_node: HashMap<NodeId, usize>,
    remote_total: f64,
}

impl Contention {
    fn collect(topology: &Topology, others: &[Placement], this: &Placement) -> Self {
        let mut cpu_demand: HashMap<usize, f64> = HashMap::new();
        let mut busy = CpuSet::new();
        let mut remote_total = 0.0;

        for placement in others.iter().chain(std::iter::once(this)) {
            let intensity = placement.intensity();
            for cpu in placement.cpus() {
                *cpu_demand.entry(cpu).or_insert(0.0) += intensity;
            }
            busy = busy.union(placement.cpus());
            remote_total += placement.remote_traffic();
        }

        let mut busy_per_node: HashMap<NodeId, usize> = HashMap::new();
        for cpu in &busy {
            if let Some(node) = topology.node_of_cpu(cpu) {
                *busy_per_node.entry(node).or_insert(0) += 1;
            }
        }

        Self {
            cpu_demand,
            busy_per_node,
            remote_total,
        }
    }

    fn cpu_demand(&self, cpu: usize) -> f64 {
        self.cpu_demand.get(&cpu).copied().unwrap_or(0.0)
    }

    fn busy_on(&self, node: NodeId) -> usize {
        self.busy_per_node.get(&node).copied().unwrap_or(0)
    }
}
