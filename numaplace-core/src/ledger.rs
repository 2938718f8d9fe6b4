//! Per-node memory bookkeeping across successive placements
//!
//! The planner itself is stateless. Callers keep a `NodeLedger`, hand its
//! `snapshot()` to every planning call, and debit the placed VM's memory
//! before planning the next one. Debits are all-or-nothing, so a ledger never
//! goes negative.

use serde::{Deserialize, Serialize};

use crate::error::{NumaError, NumaResult};
use crate::placement::Placement;
use crate::request::NodeResource;
use crate::topology::NodeId;

/// How a VM's memory is split across the nodes of its placement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySpread {
    /// Spread as evenly as each node's remaining memory allows
    #[default]
    Even,
    /// Fill nodes in placement order
    FirstFit,
}

/// Memory taken from one node by a debit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDebit {
    pub node: NodeId,
    pub bytes: u64,
}

/// Remaining memory per node, owned by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLedger {
    entries: Vec<NodeResource>,
}

impl NodeLedger {
    pub fn new(resources: Vec<NodeResource>) -> NumaResult<Self> {
        for (i, entry) in resources.iter().enumerate() {
            if resources[..i].iter().any(|r| r.node == entry.node) {
                return Err(NumaError::invalid_input(
                    "node_resources",
                    format!("{} is listed twice", entry.node),
                ));
            }
        }
        Ok(Self { entries: resources })
    }

    /// Per-call planner input, in ledger order
    pub fn snapshot(&self) -> Vec<NodeResource> {
        self.entries.clone()
    }

    pub fn remaining(&self, node: NodeId) -> Option<u64> {
        self.entry(node).map(|e| e.memory_available)
    }

    pub fn total_remaining(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.memory_available)
            .fold(0u64, u64::saturating_add)
    }

    fn entry(&self, node: NodeId) -> Option<&NodeResource> {
        self.entries.iter().find(|e| e.node == node)
    }

    fn entry_mut(&mut self, node: NodeId) -> Option<&mut NodeResource> {
        self.entries.iter_mut().find(|e| e.node == node)
    }

    /// Remove exactly `memory` bytes from the placement's nodes.
    ///
    /// Fails without touching the ledger if those nodes cannot cover it.
    pub fn debit(
        &mut self,
        placement: &Placement,
        memory: u64,
        spread: MemorySpread,
    ) -> NumaResult<Vec<MemoryDebit>> {
        let mut available = Vec::with_capacity(placement.nodes().len());
        for node in placement.nodes() {
            let remaining = self.remaining(*node).ok_or_else(|| {
                NumaError::invalid_input("placement", format!("{} is not in the ledger", node))
            })?;
            available.push((*node, remaining));
        }

        let total = available
            .iter()
            .map(|(_, bytes)| *bytes)
            .fold(0u64, u64::saturating_add);
        if total < memory {
            return Err(NumaError::InsufficientMemory {
                requested: memory,
                available: total,
            });
        }

        let debits = match spread {
            MemorySpread::Even => split_even(&available, memory),
            MemorySpread::FirstFit => split_first_fit(&available, memory),
        };

        for debit in &debits {
            if let Some(entry) = self.entry_mut(debit.node) {
                entry.memory_available -= debit.bytes;
            }
        }

        Ok(debits)
    }

    /// Return memory to a node, e.g. when a VM stops
    pub fn credit(&mut self, node: NodeId, bytes: u64) -> NumaResult<()> {
        let entry = self.entry_mut(node).ok_or_else(|| {
            NumaError::invalid_input("node", format!("{} is not in the ledger", node))
        })?;
        entry.memory_available = entry.memory_available.saturating_add(bytes);
        Ok(())
    }
}

/// Water-fill: smallest nodes first, each taking at most an equal share of
/// what is left. The caller guarantees the nodes can cover `memory`.
fn split_even(available: &[(NodeId, u64)], memory: u64) -> Vec<MemoryDebit> {
    let mut order: Vec<usize> = (0..available.len()).collect();
    order.sort_by_key(|&i| (available[i].1, i));

    let mut taken = vec![0u64; available.len()];
    let mut left = memory;
    for (position, &i) in order.iter().enumerate() {
        let nodes_left = (order.len() - position) as u64;
        let share = left.div_ceil(nodes_left);
        let take = share.min(available[i].1).min(left);
        taken[i] = take;
        left -= take;
    }

    available
        .iter()
        .zip(taken)
        .filter(|(_, bytes)| *bytes > 0)
        .map(|((node, _), bytes)| MemoryDebit { node: *node, bytes })
        .collect()
}

fn split_first_fit(available: &[(NodeId, u64)], memory: u64) -> Vec<MemoryDebit> {
    let mut left = memory;
    let mut debits = Vec::new();
    for (node, bytes) in available {
        if left == 0 {
            break;
        }
        let take = (*bytes).min(left);
        if take > 0 {
            debits.push(MemoryDebit { node: *node, bytes: take });
            left -= take;
        }
    }
    debits
}
