//! Physical CPU sets
//!
//! `CpuSet` is an immutable value type over physical CPU ids. Set operations
//! return new sets; equality is set equality. The text form is the Linux
//! cpulist syntax (`"0-3,8,10-11"`), which is also how sets are serialized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{NumaError, NumaResult};

/// A set of physical CPU ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CpuSet {
    cpus: BTreeSet<usize>,
}

impl CpuSet {
    /// The empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// CPUs `start..end_exclusive`
    pub fn with_range(start: usize, end_exclusive: usize) -> Self {
        (start..end_exclusive).collect()
    }

    pub fn singleton(cpu: usize) -> Self {
        std::iter::once(cpu).collect()
    }

    pub fn union(&self, other: &CpuSet) -> CpuSet {
        Self {
            cpus: self.cpus.union(&other.cpus).copied().collect(),
        }
    }

    pub fn intersection(&self, other: &CpuSet) -> CpuSet {
        Self {
            cpus: self.cpus.intersection(&other.cpus).copied().collect(),
        }
    }

    pub fn difference(&self, other: &CpuSet) -> CpuSet {
        Self {
            cpus: self.cpus.difference(&other.cpus).copied().collect(),
        }
    }

    /// Number of CPUs in the set
    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    pub fn contains(&self, cpu: usize) -> bool {
        self.cpus.contains(&cpu)
    }

    pub fn is_subset(&self, other: &CpuSet) -> bool {
        self.cpus.is_subset(&other.cpus)
    }

    /// CPU ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.cpus.iter().copied()
    }

    /// Parse a Linux cpulist such as `"0-3,8,10-11"`
    pub fn parse_cpulist(s: &str) -> NumaResult<Self> {
        let mut cpus = BTreeSet::new();

        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            if let Some((start, end)) = part.split_once('-') {
                let start = parse_cpu_id(start, part)?;
                let end = parse_cpu_id(end, part)?;
                if start > end {
                    return Err(NumaError::invalid_input(
                        "cpulist",
                        format!("descending range '{}'", part),
                    ));
                }
                cpus.extend(start..=end);
            } else {
                cpus.insert(parse_cpu_id(part, part)?);
            }
        }

        Ok(Self { cpus })
    }
}

fn parse_cpu_id(token: &str, part: &str) -> NumaResult<usize> {
    token.trim().parse::<usize>().map_err(|e| {
        NumaError::invalid_input("cpulist", format!("bad entry '{}': {}", part, e))
    })
}

impl FromIterator<usize> for CpuSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            cpus: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CpuSet {
    type Item = usize;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, usize>>;

    fn into_iter(self) -> Self::IntoIter {
        self.cpus.iter().copied()
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut iter = self.iter().peekable();

        while let Some(start) = iter.next() {
            let mut end = start;
            while let Some(&next) = iter.peek() {
                if next != end + 1 {
                    break;
                }
                end = next;
                iter.next();
            }

            if !first {
                f.write_str(",")?;
            }
            first = false;

            if start == end {
                write!(f, "{}", start)?;
            } else {
                write!(f, "{}-{}", start, end)?;
            }
        }

        Ok(())
    }
}

impl FromStr for CpuSet {
    type Err = NumaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_cpulist(s)
    }
}

impl TryFrom<String> for CpuSet {
    type Error = NumaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_cpulist(&value)
    }
}

impl From<CpuSet> for String {
    fn from(set: CpuSet) -> Self {
        set.to_string()
    }
}
