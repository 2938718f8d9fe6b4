//! NUMA placement planner
//!
//! Chooses the physical CPUs for a starting VM so that its memory stays as
//! local as the host allows. The planner is split into:
//! - `candidates`: node subset enumeration, feasibility and ranking
//! - `strategies`: strategy selection, closest-CPU choice and the spread baseline
//! - `mod`: the `Planner` entry points
//!
//! Planning is pure: inputs are borrowed, never mutated, and identical inputs
//! always produce the same plan. Keeping per-node memory up to date between
//! calls is the caller's job (see [`crate::ledger::NodeLedger`]).

pub(crate) mod candidates;
pub mod strategies;

use tracing::{debug, instrument, warn};

use crate::config::PlannerConfig;
use crate::cpuset::CpuSet;
use crate::error::{NumaError, NumaResult};
use crate::placement::Placement;
use crate::request::{NodeResource, VmResourceRequest};
use crate::topology::Topology;

use candidates::SearchSpace;

pub use strategies::{spread_placement, PlacementStrategy};

/// Plans vCPU placements against a host topology
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// CPUs for `request`, or `Ok(None)` when no set of nodes can hold it.
    ///
    /// Errors are reserved for malformed input (unknown or duplicated nodes);
    /// running out of capacity is a normal `None`.
    pub fn plan(
        &self,
        topology: &Topology,
        node_resources: &[NodeResource],
        request: &VmResourceRequest,
    ) -> NumaResult<Option<CpuSet>> {
        Ok(self
            .plan_placement(topology, node_resources, request)?
            .map(|placement| placement.cpus().clone()))
    }

    /// Like [`Planner::plan`], but also reports the nodes the VM's memory is
    /// confined to
    #[instrument(skip_all, fields(vcpus = request.vcpus(), memory = request.memory(), nodes = node_resources.len()))]
    pub fn plan_placement(
        &self,
        topology: &Topology,
        node_resources: &[NodeResource],
        request: &VmResourceRequest,
    ) -> NumaResult<Option<Placement>> {
        check_resources(topology, node_resources)?;

        let space = SearchSpace::new(topology, node_resources, request);
        let everything: Vec<usize> = (0..space.len()).collect();
        if !space.is_feasible(&everything) {
            warn!(
                vcpus = request.vcpus(),
                memory = request.memory(),
                "no NUMA placement satisfies the request"
            );
            return Ok(None);
        }

        let exhaustive = space.len() <= self.config.max_exhaustive_nodes;
        let candidate = if exhaustive {
            space.exhaustive()
        } else {
            space.greedy()
        };
        let Some(candidate) = candidate else {
            return Err(NumaError::invariant(
                "plan",
                "search found no subset although all nodes together are feasible",
            ));
        };

        let count = request.vcpus() as usize;
        let mut positions: Vec<usize> = candidate.positions.to_vec();
        let mut choice = strategies::closest_cpus(&space, &positions, count);

        // The mean distance of the chosen CPUs must not exceed the spread
        // baseline's. On asymmetric hosts a tight subset can lose to the
        // whole node list, so fall back to it when it is strictly closer.
        let (baseline, baseline_cpus) = (space.spread_reach(), topology.cpu_count());
        if exceeds_mean(choice.reach, positions.len() * count, baseline, everything.len() * baseline_cpus) {
            let wide = strategies::closest_cpus(&space, &everything, count);
            if exceeds_mean(choice.reach, positions.len(), wide.reach, everything.len()) {
                debug!(
                    subset = positions.len(),
                    nodes = everything.len(),
                    "widening placement to every node to keep mean distance below spread"
                );
                positions = everything;
                choice = wide;
            }
        }

        let nodes = positions.iter().map(|&p| space.node(p)).collect();
        let placement = Placement::new(request.vcpus(), nodes, choice.cpus)?;

        debug!(
            search = if exhaustive { "exhaustive" } else { "greedy" },
            %placement,
            "planned NUMA placement"
        );
        Ok(Some(placement))
    }

    /// Place `request` with an explicit strategy
    pub fn plan_with_strategy(
        &self,
        topology: &Topology,
        node_resources: &[NodeResource],
        request: &VmResourceRequest,
        strategy: PlacementStrategy,
    ) -> NumaResult<Option<Placement>> {
        debug!(strategy = strategy.name(), "placing with explicit strategy");
        match strategy {
            PlacementStrategy::NumaAware => self.plan_placement(topology, node_resources, request),
            PlacementStrategy::Spread => {
                check_resources(topology, node_resources)?;
                spread_placement(topology, node_resources, request)
            }
        }
    }
}

/// Plan with the default configuration
pub fn plan(
    topology: &Topology,
    node_resources: &[NodeResource],
    request: &VmResourceRequest,
) -> NumaResult<Option<CpuSet>> {
    Planner::default().plan(topology, node_resources, request)
}

/// Whether `total / count` is strictly above `other_total / other_count`
fn exceeds_mean(total: u64, count: usize, other_total: u64, other_count: usize) -> bool {
    u128::from(total) * other_count as u128 > u128::from(other_total) * count as u128
}

fn check_resources(topology: &Topology, node_resources: &[NodeResource]) -> NumaResult<()> {
    for (i, resource) in node_resources.iter().enumerate() {
        topology.check_node(resource.node)?;
        if node_resources[..i].iter().any(|r| r.node == resource.node) {
            return Err(NumaError::invalid_input(
                "node_resources",
                format!("{} is listed twice", resource.node),
            ));
        }
    }
    Ok(())
}
