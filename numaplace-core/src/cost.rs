//! Memory access cost records and their aggregation
//!
//! `AccessCost` values combine with a commutative monoid: `worst` takes the
//! max, `best` takes the min, `average` and `bandwidth` add up. The same
//! reduction folds per-CPU costs into one VM and per-VM costs into a fleet.
//! Because every component operation is associative and commutative, partial
//! reductions can be computed in any grouping and merged afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Distance and bandwidth summary of one or more placements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccessCost {
    /// Largest node distance observed
    pub worst: u32,
    /// Mean node distance
    pub average: f64,
    /// Contention-adjusted share of memory bandwidth (relative units)
    pub bandwidth: f64,
    /// Smallest node distance observed
    pub best: u32,
}

impl AccessCost {
    /// Neutral element of [`AccessCost::combine`].
    ///
    /// `worst` starts at the bottom of the distance domain and `best` at the
    /// top, so that any real distance replaces them.
    pub const IDENTITY: AccessCost = AccessCost {
        worst: u32::MIN,
        average: 0.0,
        bandwidth: 0.0,
        best: u32::MAX,
    };

    pub fn new(worst: u32, average: f64, bandwidth: f64, best: u32) -> Self {
        Self {
            worst,
            average,
            bandwidth,
            best,
        }
    }

    pub fn combine(self, other: AccessCost) -> AccessCost {
        AccessCost {
            worst: self.worst.max(other.worst),
            average: self.average + other.average,
            bandwidth: self.bandwidth + other.bandwidth,
            best: self.best.min(other.best),
        }
    }

    /// Fold a sequence of costs; the empty sequence yields [`AccessCost::IDENTITY`]
    pub fn reduce<I>(costs: I) -> AccessCost
    where
        I: IntoIterator<Item = AccessCost>,
    {
        costs.into_iter().fold(AccessCost::IDENTITY, AccessCost::combine)
    }

    pub fn is_identity(&self) -> bool {
        *self == AccessCost::IDENTITY
    }
}

impl Default for AccessCost {
    fn default() -> Self {
        AccessCost::IDENTITY
    }
}

impl Sum for AccessCost {
    fn sum<I: Iterator<Item = AccessCost>>(iter: I) -> Self {
        AccessCost::reduce(iter)
    }
}

impl<'a> Sum<&'a AccessCost> for AccessCost {
    fn sum<I: Iterator<Item = &'a AccessCost>>(iter: I) -> Self {
        AccessCost::reduce(iter.copied())
    }
}

impl fmt::Display for AccessCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worst={} average={:.3} best={} bandwidth={:.5}",
            self.worst, self.average, self.best, self.bandwidth
        )
    }
}
