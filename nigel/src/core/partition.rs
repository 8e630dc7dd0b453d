//! Static hash partitioning of candidates across independent workers.
//!
//! Workers never talk to each other. Each one keeps the candidates whose key
//! hash lands on its index, so N workers launched with `1/N .. N/N` cover the
//! list exactly once.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::core::candidate::Candidate;
use crate::core::errors::PartitionError;

/// Worker slot, 0-based internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPartition {
    pub worker_count: u32,
    pub worker_index: u32,
}

impl HashPartition {
    /// Partition that accepts every candidate.
    pub fn none() -> Self {
        Self {
            worker_count: 1,
            worker_index: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.worker_count > 1
    }

    /// Whether `key` belongs to this worker.
    pub fn accepts(&self, key: &str) -> bool {
        if !self.is_active() {
            return true;
        }
        shard_of(key, self.worker_count) == self.worker_index
    }
}

impl Default for HashPartition {
    fn default() -> Self {
        Self::none()
    }
}

/// Parses the 1-based `INDEX/TOTAL` form.
impl FromStr for HashPartition {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, total) = s
            .split_once('/')
            .ok_or_else(|| PartitionError::Format(s.to_string()))?;
        let index: u32 = index
            .trim()
            .parse()
            .map_err(|_| PartitionError::Format(s.to_string()))?;
        let total: u32 = total
            .trim()
            .parse()
            .map_err(|_| PartitionError::Format(s.to_string()))?;
        if total < 1 || index < 1 || index > total {
            return Err(PartitionError::Range(s.to_string()));
        }
        Ok(Self {
            worker_count: total,
            worker_index: index - 1,
        })
    }
}

impl fmt::Display for HashPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.worker_index + 1, self.worker_count)
    }
}

/// SHA-256 of `key` as a big-endian integer, reduced modulo `count`.
pub fn shard_of(key: &str, count: u32) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let modulus = u64::from(count.max(1));
    let rem = digest
        .iter()
        .fold(0u64, |acc, byte| (acc * 256 + u64::from(*byte)) % modulus);
    rem as u32
}

/// Keep only the candidates owned by `partition`, preserving order.
pub fn filter_by_partition(candidates: Vec<Candidate>, partition: HashPartition) -> Vec<Candidate> {
    if !partition.is_active() {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|c| partition.accepts(c.key()))
        .collect()
}
