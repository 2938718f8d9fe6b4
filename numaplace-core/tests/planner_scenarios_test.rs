//! End-to-end placement scenarios
//!
//! Each test builds a host, plans VMs against it and compares the resulting
//! costs with the spread baseline.

use numaplace_core::{
    evaluate, spread_placement, CpuSet, FleetSimulation, MemorySpread, NodeId, NodeLedger,
    NodeResource, Planner, PlannerConfig, Topology, VmResourceRequest,
};
use pretty_assertions::assert_eq;

const MIB: u64 = 1024 * 1024;

fn all_nodes(topology: &Topology, memory: u64) -> Vec<NodeResource> {
    topology
        .nodes()
        .into_iter()
        .map(|node| NodeResource::new(node, memory))
        .collect()
}

/// Eight nodes with a non-symmetric distance matrix, four CPUs each
fn asymmetric_eight_node_host() -> Topology {
    let distances = vec![
        vec![10, 16, 16, 22, 16, 22, 16, 22],
        vec![16, 10, 22, 16, 22, 16, 22, 16],
        vec![16, 22, 10, 16, 16, 22, 16, 22],
        vec![22, 16, 16, 10, 22, 16, 22, 16],
        vec![16, 22, 16, 22, 10, 16, 16, 22],
        vec![22, 16, 22, 16, 16, 10, 22, 16],
        vec![16, 22, 16, 22, 16, 22, 10, 16],
        vec![22, 16, 22, 16, 22, 16, 17, 10],
    ];
    let node_cpus = (0..8).map(|node| CpuSet::with_range(node * 4, node * 4 + 4)).collect();
    Topology::from_node_cpus(distances, node_cpus).unwrap()
}

#[test]
fn test_single_node_host_matches_baseline() {
    let topology = Topology::uniform(1, 2, 10).unwrap();
    let resources = all_nodes(&topology, 1024 * MIB);
    let request = VmResourceRequest::new(2, 512 * MIB, topology.all_cpus().clone()).unwrap();

    let placement = Planner::default()
        .plan_placement(&topology, &resources, &request)
        .unwrap()
        .unwrap();
    assert_eq!(placement.cpus(), &CpuSet::with_range(0, 2));

    let baseline = spread_placement(&topology, &resources, &request).unwrap().unwrap();
    let aware_cost = evaluate(&topology, &[], &placement).unwrap();
    let baseline_cost = evaluate(&topology, &[], &baseline).unwrap();

    assert_eq!(aware_cost, baseline_cost);
    assert_eq!(aware_cost.worst, 10);
    assert_eq!(aware_cost.best, 10);
    assert_eq!(aware_cost.average, 10.0);
}

#[test]
fn test_two_node_host_stays_local() {
    let topology = Topology::new(
        vec![vec![10, 21], vec![21, 10]],
        vec![NodeId::new(0), NodeId::new(0), NodeId::new(1), NodeId::new(1)],
    )
    .unwrap();
    let resources = all_nodes(&topology, 1024 * MIB);
    let request = VmResourceRequest::new(2, 1024 * MIB, topology.all_cpus().clone()).unwrap();

    let placement = Planner::default()
        .plan_placement(&topology, &resources, &request)
        .unwrap()
        .unwrap();
    assert_eq!(placement.nodes(), &[NodeId::new(0)]);
    assert_eq!(topology.nodes_of(placement.cpus()), vec![NodeId::new(0)]);

    let baseline = spread_placement(&topology, &resources, &request).unwrap().unwrap();
    let aware_cost = evaluate(&topology, &[], &placement).unwrap();
    let baseline_cost = evaluate(&topology, &[], &baseline).unwrap();

    assert_eq!(aware_cost.average, 10.0);
    assert!(aware_cost.average < baseline_cost.average);
    assert_eq!(baseline_cost.worst, 21);
}

#[test]
fn test_fleet_on_asymmetric_host_is_fully_placed() {
    let topology = asymmetric_eight_node_host();
    assert!(!topology.is_symmetric());

    let vm_count = 10;
    let vcpus = (topology.cpu_count() / vm_count).max(2) as u32;
    assert_eq!(vcpus, 3);

    let request = VmResourceRequest::new(vcpus, 2048 * MIB, topology.all_cpus().clone()).unwrap();
    let requests = vec![request; vm_count];

    let report = FleetSimulation::new(&topology, Planner::default(), all_nodes(&topology, 4096 * MIB))
        .unwrap()
        .run(&requests)
        .unwrap();

    assert!(report.unplaced.is_empty());
    for vm in &report.vms {
        assert!(vm.numa_placed);
        assert_eq!(vm.placement.cpus().len(), 3);
        assert_eq!(vm.placement.nodes().len(), 1);
        assert_eq!(vm.cost.worst, 10);
    }
    // ties go to the node with the most memory left, so the first eight VMs
    // take one node each before any node is reused
    let first_nodes: Vec<NodeId> = report.vms[..8].iter().map(|vm| vm.placement.nodes()[0]).collect();
    assert_eq!(first_nodes, topology.nodes());

    assert!(report.is_non_regressing());
    assert!(report.aware.bandwidth > report.baseline.bandwidth);
    assert_eq!(report.baseline.worst, 22);
}

#[test]
fn test_greedy_search_places_the_same_fleet() {
    let topology = asymmetric_eight_node_host();
    let config = PlannerConfig {
        max_exhaustive_nodes: 4,
        ..Default::default()
    };
    let request = VmResourceRequest::new(3, 2048 * MIB, topology.all_cpus().clone()).unwrap();

    let report = FleetSimulation::new(&topology, Planner::new(config), all_nodes(&topology, 4096 * MIB))
        .unwrap()
        .run(&vec![request; 10])
        .unwrap();

    assert!(report.unplaced.is_empty());
    assert!(report.is_non_regressing());
}

#[test]
fn test_ledger_never_goes_negative() {
    let topology = Topology::uniform(4, 4, 20).unwrap();
    let planner = Planner::default();
    let mut ledger = NodeLedger::new(all_nodes(&topology, 1000)).unwrap();
    let initial = ledger.total_remaining();

    let mut placed = 0u64;
    for memory in [700, 700, 900, 300, 1200, 50, 400, 333] {
        let request = VmResourceRequest::new(2, memory, topology.all_cpus().clone()).unwrap();
        let Some(placement) = planner
            .plan_placement(&topology, &ledger.snapshot(), &request)
            .unwrap()
        else {
            continue;
        };

        let debits = ledger.debit(&placement, memory, MemorySpread::Even).unwrap();
        assert_eq!(debits.iter().map(|d| d.bytes).sum::<u64>(), memory);
        for debit in &debits {
            assert!(placement.nodes().contains(&debit.node));
        }
        placed += memory;
    }

    assert_eq!(ledger.total_remaining(), initial - placed);
    for node in topology.nodes() {
        assert!(ledger.remaining(node).unwrap() <= 1000);
    }
}

#[test]
fn test_first_fit_ledger_fills_nodes_in_order() {
    let topology = Topology::uniform(2, 2, 21).unwrap();
    let config = PlannerConfig {
        memory_spread: MemorySpread::FirstFit,
        ..Default::default()
    };
    let request = VmResourceRequest::new(2, 150, topology.all_cpus().clone()).unwrap();

    let report = FleetSimulation::new(&topology, Planner::new(config), all_nodes(&topology, 100))
        .unwrap()
        .run(&[request])
        .unwrap();

    let remaining: Vec<u64> = report.remaining.iter().map(|r| r.memory_available).collect();
    assert_eq!(remaining, vec![0, 50]);
}
