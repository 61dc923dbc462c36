// Rarity Pipeline - Keyed scoring over line protocol streams
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Result sinks
//!
//! One [`ScoreRecord`] is emitted per scored observation, order violations
//! included.

use std::io::Write;

use chrono::{DateTime, Utc};
use rarity::Period;

use crate::adapter::Scored;
use crate::error::SinkError;
use crate::ingest::Observation;
use crate::line::encode_record;

/// A scored observation
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    /// Detector key
    pub key: String,
    /// Host the observation came from
    pub host: String,
    /// Observed value
    pub value: f64,
    /// Source timestamp in nanoseconds
    pub timestamp_ns: i64,
    /// Anomaly score in `[0, 100]`
    pub score: f64,
    /// Period the detector was in
    pub period: Period,
    /// Whether the score is flagged
    pub is_anomaly: bool,
    /// Collection time derived from the timestamp
    pub collected_at: DateTime<Utc>,
    /// When the pipeline read the record
    pub received_at: DateTime<Utc>,
    /// When the detector produced the score
    pub scored_at: DateTime<Utc>,
    /// Distinct patterns held by the detector after scoring
    pub pattern_count: usize,
}

impl ScoreRecord {
    /// Combine an observation with its score.
    pub fn new(observation: &Observation, scored: &Scored, scored_at: DateTime<Utc>) -> Self {
        let result = scored.result;
        Self {
            key: observation.key.clone(),
            host: observation.host.clone(),
            value: observation.value,
            timestamp_ns: observation.timestamp_ns,
            score: result.score,
            period: result.period,
            is_anomaly: result.is_anomaly,
            collected_at: observation.collected_at,
            received_at: observation.received_at,
            scored_at,
            pattern_count: scored.pattern_count,
        }
    }
}

/// Destination of scored records
pub trait ResultSink {
    /// Emit one record
    fn emit(&mut self, record: &ScoreRecord) -> Result<(), SinkError>;

    /// Flush buffered records
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<K: ResultSink + ?Sized> ResultSink for Box<K> {
    fn emit(&mut self, record: &ScoreRecord) -> Result<(), SinkError> {
        (**self).emit(record)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Writes each record as one line protocol line
#[derive(Debug)]
pub struct LineSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> LineSink<W> {
    /// Create a sink over a writer
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of lines written
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Consume the sink and return the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for LineSink<W> {
    fn emit(&mut self, record: &ScoreRecord) -> Result<(), SinkError> {
        let line = encode_record(record);
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects records in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Vec<ScoreRecord>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Records emitted so far
    pub fn records(&self) -> &[ScoreRecord] {
        &self.records
    }

    /// Take the records, leaving the sink empty
    pub fn take(&mut self) -> Vec<ScoreRecord> {
        std::mem::take(&mut self.records)
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no record was emitted
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ResultSink for MemorySink {
    fn emit(&mut self, record: &ScoreRecord) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }
}
