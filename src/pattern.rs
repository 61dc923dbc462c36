//! Occurrence counting for bucket patterns.
//!
//! Patterns are keyed by their exact bucket sequence, so two distinct windows
//! can never share a counter.

use std::collections::HashMap;

/// A normalized observation.
pub type Bucket = i64;

/// Occurrence counters per exact window contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternCounts {
    counts: HashMap<Box<[Bucket]>, u64>,
}

impl PatternCounts {
    /// Create an empty counter table
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence of `pattern` and return the updated count.
    pub fn record(&mut self, pattern: &[Bucket]) -> u64 {
        if let Some(count) = self.counts.get_mut(pattern) {
            *count += 1;
            return *count;
        }
        self.counts.insert(pattern.into(), 1);
        1
    }

    /// Number of times `pattern` has been recorded
    pub fn get(&self, pattern: &[Bucket]) -> u64 {
        self.counts.get(pattern).copied().unwrap_or(0)
    }

    /// Set a counter directly (used when restoring persisted state).
    pub fn insert(&mut self, pattern: Vec<Bucket>, count: u64) {
        self.counts.insert(pattern.into_boxed_slice(), count);
    }

    /// Number of distinct patterns seen
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if no pattern has been recorded
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counters
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Iterate over `(pattern, count)` pairs in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&[Bucket], u64)> {
        self.counts.iter().map(|(p, &c)| (&**p, c))
    }

    /// Entries sorted by pattern, for deterministic output
    pub fn sorted(&self) -> Vec<(&[Bucket], u64)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Forget every pattern
    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Estimate memory usage in bytes
    pub fn estimated_memory(&self) -> usize {
        let entries: usize = self
            .counts
            .keys()
            .map(|p| p.len() * std::mem::size_of::<Bucket>() + 32) // data + overhead
            .sum();
        entries + 48
    }
}
