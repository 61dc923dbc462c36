// Rarity Pipeline - Keyed scoring over line protocol streams
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Pipeline statistics and progress logging

use chrono::{DateTime, Utc};
use rarity::Period;
use serde::Serialize;
use tracing::info;

use crate::adapter::Scored;
use crate::line::format_collected;

/// Counters of a pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Records read from the input
    pub records_read: u64,
    /// Records matching no ingestion rule
    pub records_skipped: u64,
    /// Records that failed to parse
    pub malformed_records: u64,
    /// Observations passed to a detector
    pub observations_scored: u64,
    /// Scores flagged as anomalies
    pub anomalies: u64,
    /// Observations discarded for arriving out of order
    pub order_violations: u64,
    /// Observations scored during training
    pub training: u64,
    /// States written back
    pub states_persisted: u64,
    /// Scoring calls that failed on the store or the sink
    pub failures: u64,
}

impl PipelineStats {
    /// Account for one adapter cycle
    pub fn record(&mut self, scored: &Scored) {
        self.observations_scored += 1;
        if scored.result.is_anomaly {
            self.anomalies += 1;
        }
        match scored.result.period {
            Period::OrderViolation => self.order_violations += 1,
            Period::Training => self.training += 1,
            Period::Rest | Period::Regular => {}
        }
        if scored.persisted {
            self.states_persisted += 1;
        }
    }

    /// Add another set of counters
    pub fn merge(&mut self, other: &PipelineStats) {
        self.records_read += other.records_read;
        self.records_skipped += other.records_skipped;
        self.malformed_records += other.malformed_records;
        self.observations_scored += other.observations_scored;
        self.anomalies += other.anomalies;
        self.order_violations += other.order_violations;
        self.training += other.training;
        self.states_persisted += other.states_persisted;
        self.failures += other.failures;
    }
}

/// Logs a progress line every `every` records
#[derive(Debug, Clone)]
pub struct ProgressLog {
    every: u64,
    count: u64,
}

impl ProgressLog {
    /// Log every `every` records. Zero disables logging.
    pub fn new(every: u64) -> Self {
        Self { every, count: 0 }
    }

    /// Count one record. Returns true when a progress line was logged.
    pub fn tick(&mut self, last_collected: Option<&DateTime<Utc>>) -> bool {
        if self.every == 0 {
            return false;
        }
        self.count += 1;
        if self.count < self.every {
            return false;
        }

        let last = last_collected
            .map(format_collected)
            .unwrap_or_else(|| "-".to_string());
        info!("{} messages read. Last metric collected at: {}", self.count, last);
        self.count = 0;
        true
    }
}
