use smallvec::SmallVec;
use std::cmp::Reverse;

use crate::cpuset::CpuSet;
use crate::request::{NodeResource, VmResourceRequest};
use crate::topology::{NodeId, Topology};

/// Positions into the caller's node resource list
pub(crate) type Positions = SmallVec<[usize; 8]>;

/// Ordering key for node subsets of equal size; smaller is better
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Rank {
    max_distance: u32,
    sum_distance: u64,
    memory: Reverse<u64>,
    positions: Positions,
}

#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub positions: Positions,
    pub rank: Rank,
}

/// Node subsets the planner may choose from, with the request's eligible
/// CPUs pre-split per node
pub(crate) struct SearchSpace<'a> {
    topology: &'a Topology,
    resources: &'a [NodeResource],
    eligible: Vec<CpuSet>,
    vcpus: usize,
    memory: u64,
}

impl<'a> SearchSpace<'a> {
    pub fn new(topology: &'a Topology, resources: &'a [NodeResource], request: &VmResourceRequest) -> Self {
        let eligible = resources
            .iter()
            .map(|r| topology.cpus_of_node(r.node).intersection(request.affinity()))
            .collect();

        Self {
            topology,
            resources,
            eligible,
            vcpus: request.vcpus() as usize,
            memory: request.memory(),
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn node(&self, position: usize) -> NodeId {
        self.resources[position].node
    }

    pub fn eligible(&self, position: usize) -> &CpuSet {
        &self.eligible[position]
    }

    /// Memory and CPU capacity both cover the request. Nodes never share
    /// CPUs, so the eligible CPU count of a subset is a plain sum.
    pub fn is_feasible(&self, positions: &[usize]) -> bool {
        let memory: u64 = positions
            .iter()
            .map(|&p| self.resources[p].memory_available)
            .fold(0u64, u64::saturating_add);
        let cpus: usize = positions.iter().map(|&p| self.eligible[p].len()).sum();
        memory >= self.memory && cpus >= self.vcpus
    }

    /// Summed distance from `position`'s node to every node of `positions`
    pub fn reach(&self, position: usize, positions: &[usize]) -> u64 {
        let from = self.node(position);
        positions
            .iter()
            .map(|&p| u64::from(self.topology.distance(from, self.node(p))))
            .sum()
    }

    /// Summed distance from every host CPU to every candidate node, the
    /// numerator of the spread baseline's mean distance
    pub fn spread_reach(&self) -> u64 {
        self.topology
            .all_cpus()
            .iter()
            .filter_map(|cpu| self.topology.node_of_cpu(cpu))
            .map(|from| {
                self.resources
                    .iter()
                    .map(|r| u64::from(self.topology.distance(from, r.node)))
                    .sum::<u64>()
            })
            .sum()
    }

    pub fn rank(&self, positions: &[usize]) -> Rank {
        let mut max_distance = 0;
        let mut sum_distance = 0u64;
        for &a in positions {
            for &b in positions {
                let d = self.topology.distance(self.node(a), self.node(b));
                max_distance = max_distance.max(d);
                sum_distance += u64::from(d);
            }
        }
        let memory = positions
            .iter()
            .map(|&p| self.resources[p].memory_available)
            .fold(0u64, u64::saturating_add);

        let mut sorted: Positions = positions.iter().copied().collect();
        sorted.sort_unstable();

        Rank {
            max_distance,
            sum_distance,
            memory: Reverse(memory),
            positions: sorted,
        }
    }

    fn candidate(&self, positions: Positions) -> Candidate {
        let rank = self.rank(&positions);
        Candidate {
            positions: rank.positions.clone(),
            rank,
        }
    }

    /// Best feasible subset of the smallest feasible size, trying every
    /// subset of each size in turn
    pub fn exhaustive(&self) -> Option<Candidate> {
        for size in 1..=self.len() {
            let best = Combinations::new(self.len(), size)
                .filter(|positions| self.is_feasible(positions))
                .map(|positions| self.candidate(positions))
                .min_by(|a, b| a.rank.cmp(&b.rank));
            if best.is_some() {
                return best;
            }
        }
        None
    }

    /// Grow a subset from every seed node, always adding the node that keeps
    /// the subset tightest, and keep the smallest, best-ranked result
    pub fn greedy(&self) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;

        for seed in 0..self.len() {
            let mut chosen: Positions = SmallVec::new();
            chosen.push(seed);

            while !self.is_feasible(&chosen) && chosen.len() < self.len() {
                let next = (0..self.len())
                    .filter(|p| !chosen.contains(p))
                    .min_by_key(|&p| {
                        let mut grown = chosen.clone();
                        grown.push(p);
                        self.rank(&grown)
                    });
                match next {
                    Some(p) => chosen.push(p),
                    None => break,
                }
            }

            if !self.is_feasible(&chosen) {
                continue;
            }

            let candidate = self.candidate(chosen);
            let better = match &best {
                None => true,
                Some(current) => {
                    (candidate.positions.len(), &candidate.rank)
                        < (current.positions.len(), &current.rank)
                }
            };
            if better {
                best = Some(candidate);
            }
        }

        best
    }
}

/// k-subsets of `0..n` in lexicographic order
pub(crate) struct Combinations {
    n: usize,
    indices: Positions,
    started: bool,
    done: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            started: false,
            done: k == 0 || k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Positions;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.indices.clone());
        }

        let k = self.indices.len();
        let mut i = k;
        while i > 0 {
            i -= 1;
            if self.indices[i] < self.n - k + i {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                return Some(self.indices.clone());
            }
        }

        self.done = true;
        None
    }
}
