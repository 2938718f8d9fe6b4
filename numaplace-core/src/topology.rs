//! Host NUMA topology
//!
//! An immutable description of a host: its NUMA nodes, the node-to-node
//! distance matrix, and which node owns each physical CPU. Built once per host
//! and shared read-only by every planning and evaluation call.
//!
//! The distance matrix is used as given. It need not be symmetric: multi-hop
//! interconnects (e.g. 8-socket Opteron boards) report different distances
//! for each direction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::cpuset::CpuSet;
use crate::error::{NumaError, NumaResult};

/// Conventional local-access distance reported by ACPI SLIT tables
pub const LOCAL_DISTANCE: u32 = 10;

/// Identifier of a NUMA node within one topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Row/column of this node in the distance matrix
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// NUMA topology of a single host
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    distances: Vec<Vec<u32>>,
    cpu_to_node: BTreeMap<usize, NodeId>,
    node_cpus: Vec<CpuSet>,
    all_cpus: CpuSet,
}

impl Topology {
    /// Build a topology where CPU `i` belongs to `cpu_to_node[i]`.
    pub fn new(distances: Vec<Vec<u32>>, cpu_to_node: Vec<NodeId>) -> NumaResult<Self> {
        let node_count = Self::check_distances(&distances)?;

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        for (cpu, node) in cpu_to_node.iter().enumerate() {
            if node.index() >= node_count {
                return Err(NumaError::InvalidTopology {
                    message: format!(
                        "cpu {} maps to {} but the distance matrix has {} nodes",
                        cpu, node, node_count
                    ),
                });
            }
            members[node.index()].push(cpu);
        }
        let node_cpus = members.into_iter().map(CpuSet::from_iter).collect();

        let all_cpus = CpuSet::with_range(0, cpu_to_node.len());
        let cpu_to_node = cpu_to_node.into_iter().enumerate().collect();

        Ok(Self {
            distances,
            cpu_to_node,
            node_cpus,
            all_cpus,
        })
    }

    /// Build a topology from the CPU list of each node.
    ///
    /// CPU ids may be sparse, but every CPU must appear in exactly one node.
    pub fn from_node_cpus(distances: Vec<Vec<u32>>, node_cpus: Vec<CpuSet>) -> NumaResult<Self> {
        let node_count = Self::check_distances(&distances)?;
        if node_cpus.len() != node_count {
            return Err(NumaError::InvalidTopology {
                message: format!(
                    "{} CPU lists given for a {}x{} distance matrix",
                    node_cpus.len(),
                    node_count,
                    node_count
                ),
            });
        }

        let mut cpu_to_node = BTreeMap::new();
        for (index, cpus) in node_cpus.iter().enumerate() {
            for cpu in cpus {
                if let Some(previous) = cpu_to_node.insert(cpu, NodeId::new(index)) {
                    return Err(NumaError::InvalidTopology {
                        message: format!(
                            "cpu {} is listed under both {} and {}",
                            cpu,
                            previous,
                            NodeId::new(index)
                        ),
                    });
                }
            }
        }

        let all_cpus = cpu_to_node.keys().copied().collect();

        Ok(Self {
            distances,
            cpu_to_node,
            node_cpus,
            all_cpus,
        })
    }

    /// A host of `nodes` identical nodes with `cpus_per_node` consecutive CPUs
    /// each, `LOCAL_DISTANCE` on the diagonal and `remote` elsewhere.
    pub fn uniform(nodes: usize, cpus_per_node: usize, remote: u32) -> NumaResult<Self> {
        let distances = (0..nodes)
            .map(|a| {
                (0..nodes)
                    .map(|b| if a == b { LOCAL_DISTANCE } else { remote })
                    .collect()
            })
            .collect();
        let cpu_to_node = (0..nodes * cpus_per_node)
            .map(|cpu| NodeId::new(cpu / cpus_per_node.max(1)))
            .collect();
        Self::new(distances, cpu_to_node)
    }

    fn check_distances(distances: &[Vec<u32>]) -> NumaResult<usize> {
        let node_count = distances.len();
        if node_count == 0 {
            return Err(NumaError::InvalidTopology {
                message: "topology has no NUMA nodes".to_string(),
            });
        }
        for (row_index, row) in distances.iter().enumerate() {
            if row.len() != node_count {
                return Err(NumaError::InvalidTopology {
                    message: format!(
                        "distance matrix is not square: row {} has {} entries, expected {}",
                        row_index,
                        row.len(),
                        node_count
                    ),
                });
            }
        }
        Ok(node_count)
    }

    pub fn node_count(&self) -> usize {
        self.distances.len()
    }

    /// All node identifiers in ascending order
    pub fn nodes(&self) -> Vec<NodeId> {
        (0..self.node_count()).map(NodeId::new).collect()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        node.index() < self.node_count()
    }

    pub fn check_node(&self, node: NodeId) -> NumaResult<()> {
        if self.contains_node(node) {
            Ok(())
        } else {
            Err(NumaError::InvalidNode {
                node: node.index(),
                available: self.node_count(),
            })
        }
    }

    /// Node owning `cpu`, or `None` for a CPU the host does not have
    pub fn node_of_cpu(&self, cpu: usize) -> Option<NodeId> {
        self.cpu_to_node.get(&cpu).copied()
    }

    /// Distance from `from` to `to`, read from the matrix as stored.
    ///
    /// # Panics
    ///
    /// Panics if either node is not part of this topology; use
    /// [`Topology::check_node`] on untrusted identifiers first.
    pub fn distance(&self, from: NodeId, to: NodeId) -> u32 {
        self.distances[from.index()][to.index()]
    }

    /// CPUs owned by `node` (empty for memory-only nodes)
    ///
    /// # Panics
    ///
    /// Panics if `node` is not part of this topology.
    pub fn cpus_of_node(&self, node: NodeId) -> &CpuSet {
        &self.node_cpus[node.index()]
    }

    /// Union of the CPUs of every node
    pub fn all_cpus(&self) -> &CpuSet {
        &self.all_cpus
    }

    pub fn cpu_count(&self) -> usize {
        self.all_cpus.len()
    }

    /// Distinct nodes owning at least one CPU of `cpus`, ascending
    pub fn nodes_of(&self, cpus: &CpuSet) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = cpus.iter().filter_map(|cpu| self.node_of_cpu(cpu)).collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.node_count();
        (0..n).all(|a| (0..n).all(|b| self.distances[a][b] == self.distances[b][a]))
    }

    /// Human-readable one-line description
    pub fn summary(&self) -> String {
        format!(
            "NUMA topology: {} nodes, {} CPUs, {} distance matrix",
            self.node_count(),
            self.cpu_count(),
            if self.is_symmetric() { "symmetric" } else { "asymmetric" }
        )
    }
}
