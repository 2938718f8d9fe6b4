pub mod error;
pub mod cpuset;
pub mod topology;
pub mod request;
pub mod placement;
pub mod cost;
pub mod evaluator;
pub mod ledger;
pub mod planner;
pub mod config;
pub mod fleet;

pub use config::{HostConfig, HostParts, NodeConfig, PlannerConfig, VmRequestConfig};
pub use cost::AccessCost;
pub use cpuset::CpuSet;
pub use error::{NumaError, NumaResult};
pub use evaluator::{evaluate, evaluate_each, evaluate_fleet, evaluate_with_ratio, INTERCONNECT_BANDWIDTH_RATIO};
pub use fleet::{FleetReport, FleetSimulation, VmOutcome};
pub use ledger::{MemoryDebit, MemorySpread, NodeLedger};
pub use placement::Placement;
pub use planner::{plan, spread_placement, PlacementStrategy, Planner};
pub use request::{NodeResource, VmResourceRequest};
pub use topology::{NodeId, Topology, LOCAL_DISTANCE};
