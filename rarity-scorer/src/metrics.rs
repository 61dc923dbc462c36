// Rarity Scorer - Prometheus metrics definitions
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Prometheus metrics for the scoring service.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec, Counter,
    CounterVec, Encoder, Gauge, GaugeVec, TextEncoder,
};
use rarity::Period;
use rarity_pipeline::ScoreRecord;

lazy_static! {
    // ============================================================
    // Ingestion
    // ============================================================

    /// Input records read.
    pub static ref RECORDS_READ_TOTAL: Counter = register_counter!(
        "rarity_records_read_total",
        "Input records read"
    ).unwrap();

    /// Records matching no ingestion rule.
    pub static ref RECORDS_SKIPPED_TOTAL: Counter = register_counter!(
        "rarity_records_skipped_total",
        "Input records matching no ingestion rule"
    ).unwrap();

    /// Records that failed to parse.
    pub static ref MALFORMED_RECORDS_TOTAL: Counter = register_counter!(
        "rarity_malformed_records_total",
        "Input records that failed to parse"
    ).unwrap();

    // ============================================================
    // Scoring
    // ============================================================

    /// Scored observations by period.
    pub static ref OBSERVATIONS_TOTAL: CounterVec = register_counter_vec!(
        "rarity_observations_total",
        "Scored observations by period",
        &["period"]
    ).unwrap();

    /// Observations flagged as anomalies.
    pub static ref ANOMALIES_TOTAL: Counter = register_counter!(
        "rarity_anomalies_total",
        "Observations flagged as anomalies"
    ).unwrap();

    /// Observations discarded for arriving out of order.
    pub static ref ORDER_VIOLATIONS_TOTAL: Counter = register_counter!(
        "rarity_order_violations_total",
        "Observations discarded for arriving out of order"
    ).unwrap();

    /// Scoring calls that failed on the state store or the sink.
    pub static ref SCORING_FAILURES_TOTAL: Counter = register_counter!(
        "rarity_scoring_failures_total",
        "Scoring calls that failed on the state store or the result sink"
    ).unwrap();

    /// Last score per key.
    pub static ref LAST_SCORE: GaugeVec = register_gauge_vec!(
        "rarity_last_score",
        "Last anomaly score per detector key (0-100)",
        &["key"]
    ).unwrap();

    /// Distinct patterns held per key.
    pub static ref PATTERN_COUNT: GaugeVec = register_gauge_vec!(
        "rarity_pattern_count",
        "Distinct patterns held by each detector",
        &["key"]
    ).unwrap();

    // ============================================================
    // Replay
    // ============================================================

    /// Current replay position (row index).
    pub static ref REPLAY_POSITION: Gauge = register_gauge!(
        "rarity_replay_position",
        "Current replay position (row index)"
    ).unwrap();

    /// Rows in the replay dataset.
    pub static ref REPLAY_TOTAL_ROWS: Gauge = register_gauge!(
        "rarity_replay_total_rows",
        "Rows in the replay dataset"
    ).unwrap();

    /// Replay speed multiplier.
    pub static ref REPLAY_SPEED: Gauge = register_gauge!(
        "rarity_replay_speed",
        "Replay speed multiplier"
    ).unwrap();
}

/// Record one emitted result.
pub fn record_score(record: &ScoreRecord) {
    OBSERVATIONS_TOTAL
        .with_label_values(&[record.period.as_str()])
        .inc();
    if record.is_anomaly {
        ANOMALIES_TOTAL.inc();
    }
    if record.period == Period::OrderViolation {
        ORDER_VIOLATIONS_TOTAL.inc();
        return;
    }
    LAST_SCORE.with_label_values(&[record.key.as_str()]).set(record.score);
    PATTERN_COUNT
        .with_label_values(&[record.key.as_str()])
        .set(record.pattern_count as f64);
}

/// Record one input record.
pub fn record_input(skipped: bool) {
    RECORDS_READ_TOTAL.inc();
    if skipped {
        RECORDS_SKIPPED_TOTAL.inc();
    }
}

/// Record one unparseable record.
pub fn record_malformed() {
    MALFORMED_RECORDS_TOTAL.inc();
}

/// Record one failed scoring call.
pub fn record_failure() {
    SCORING_FAILURES_TOTAL.inc();
}

/// Update replay position metrics.
pub fn update_replay_metrics(position: usize, total: usize, speed: f64) {
    REPLAY_POSITION.set(position as f64);
    REPLAY_TOTAL_ROWS.set(total as f64);
    REPLAY_SPEED.set(speed);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
