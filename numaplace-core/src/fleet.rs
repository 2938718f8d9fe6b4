//! Fleet simulation
//!
//! Replays a sequence of VM starts on one host, planning each VM against the
//! memory left by the previous ones, and compares the resulting placements
//! with the spread baseline.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::cost::AccessCost;
use crate::error::{NumaError, NumaResult};
use crate::evaluator::evaluate_each_with_ratio;
use crate::ledger::{MemoryDebit, NodeLedger};
use crate::placement::Placement;
use crate::planner::{spread_placement, Planner};
use crate::request::{NodeResource, VmResourceRequest};
use crate::topology::Topology;

/// Tolerance on the average-distance comparison
pub const AVERAGE_TOLERANCE: f64 = 1e-3;

/// What happened to one VM of the fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmOutcome {
    pub index: usize,
    pub request: VmResourceRequest,
    /// Planner result; the spread fallback when `numa_placed` is false
    pub placement: Placement,
    pub baseline: Placement,
    pub numa_placed: bool,
    pub debits: Vec<MemoryDebit>,
    pub cost: AccessCost,
    pub baseline_cost: AccessCost,
}

/// Aggregated result of a fleet simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetReport {
    pub aware: AccessCost,
    pub baseline: AccessCost,
    pub vms: Vec<VmOutcome>,
    /// Indices of VMs the planner could not place with locality
    pub unplaced: Vec<usize>,
    /// Ledger state after all debits
    pub remaining: Vec<NodeResource>,
}

impl FleetReport {
    /// Per VM: worst and best no larger than the baseline, average no larger
    /// within [`AVERAGE_TOLERANCE`]; fleet bandwidth no lower than baseline.
    pub fn is_non_regressing(&self) -> bool {
        let per_vm = self.vms.iter().all(|vm| {
            vm.cost.worst <= vm.baseline_cost.worst
                && vm.cost.best <= vm.baseline_cost.best
                && vm.cost.average <= vm.baseline_cost.average + AVERAGE_TOLERANCE
        });
        per_vm && self.aware.bandwidth >= self.baseline.bandwidth
    }

    pub fn placed_count(&self) -> usize {
        self.vms.len() - self.unplaced.len()
    }
}

/// Sequential placement of many VMs against a shared memory ledger
pub struct FleetSimulation<'a> {
    topology: &'a Topology,
    planner: Planner,
    ledger: NodeLedger,
}

impl<'a> FleetSimulation<'a> {
    pub fn new(topology: &'a Topology, planner: Planner, node_resources: Vec<NodeResource>) -> NumaResult<Self> {
        Ok(Self {
            topology,
            planner,
            ledger: NodeLedger::new(node_resources)?,
        })
    }

    /// Place every request in order. VMs the planner cannot place fall back
    /// to the spread baseline and are not debited from the ledger.
    #[instrument(skip_all, fields(vms = requests.len()))]
    pub fn run(mut self, requests: &[VmResourceRequest]) -> NumaResult<FleetReport> {
        let host_nodes = self.ledger.snapshot();
        let spread = self.planner.config().memory_spread;

        let mut placements = Vec::with_capacity(requests.len());
        let mut baselines = Vec::with_capacity(requests.len());
        let mut debits = Vec::with_capacity(requests.len());
        let mut unplaced = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            let baseline = spread_placement(self.topology, &host_nodes, request)?.ok_or_else(|| {
                NumaError::invalid_input("node_resources", "host has no nodes to spread over")
            })?;

            let snapshot = self.ledger.snapshot();
            match self.planner.plan_placement(self.topology, &snapshot, request)? {
                Some(placement) => {
                    debits.push(self.ledger.debit(&placement, request.memory(), spread)?);
                    placements.push(placement);
                }
                None => {
                    warn!(vm = index, "falling back to spread placement");
                    unplaced.push(index);
                    debits.push(Vec::new());
                    placements.push(baseline.clone());
                }
            }
            baselines.push(baseline);
        }

        let ratio = self.planner.config().interconnect_bandwidth_ratio;
        let costs = evaluate_each_with_ratio(self.topology, &placements, ratio)?;
        let baseline_costs = evaluate_each_with_ratio(self.topology, &baselines, ratio)?;

        let report = FleetReport {
            aware: AccessCost::reduce(costs.iter().copied()),
            baseline: AccessCost::reduce(baseline_costs.iter().copied()),
            vms: requests
                .iter()
                .cloned()
                .zip(placements)
                .zip(baselines)
                .zip(debits)
                .zip(costs.into_iter().zip(baseline_costs))
                .enumerate()
                .map(|(index, ((((request, placement), baseline), debits), (cost, baseline_cost)))| VmOutcome {
                    index,
                    request,
                    placement,
                    baseline,
                    numa_placed: !unplaced.contains(&index),
                    debits,
                    cost,
                    baseline_cost,
                })
                .collect(),
            unplaced,
            remaining: self.ledger.snapshot(),
        };

        info!(
            placed = report.placed_count(),
            total = requests.len(),
            aware = %report.aware,
            baseline = %report.baseline,
            "fleet simulation finished"
        );
        Ok(report)
    }
}
