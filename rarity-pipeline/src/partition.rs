// Rarity Pipeline - Keyed scoring over line protocol streams
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Single-writer partitioning
//!
//! Every key maps to exactly one partition, so a worker that owns a
//! partition is the only writer of those keys' state.

use xxhash_rust::xxh64::xxh64;

use crate::error::{PipelineError, Result};

/// Seed for key hashing. Changing it remaps every key.
const PARTITION_SEED: u64 = 0;

/// Routes keys to a fixed number of partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    partitions: usize,
}

impl Partitioner {
    /// Create a partitioner over `partitions` slots
    pub fn new(partitions: usize) -> Result<Self> {
        if partitions == 0 {
            return Err(PipelineError::InvalidConfig(
                "partition count must be at least 1".to_string(),
            ));
        }
        Ok(Self { partitions })
    }

    /// Number of partitions
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Partition owning `key`
    pub fn partition_for(&self, key: &str) -> usize {
        (xxh64(key.as_bytes(), PARTITION_SEED) % self.partitions as u64) as usize
    }
}
