// Rarity Pipeline - Keyed scoring over line protocol streams
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Line-to-result pipeline
//!
//! A [`Pipeline`] parses records, expands them through the ingestion rules,
//! scores each observation and emits one result per observation.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::adapter::ScoringAdapter;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingest::{IngestRules, Observation};
use crate::line::{parse, LineRecord};
use crate::sink::{ResultSink, ScoreRecord};
use crate::stats::{PipelineStats, ProgressLog};
use crate::store::StateStore;

/// Scores a stream of records against a store and emits to a sink
pub struct Pipeline<S, K> {
    adapter: ScoringAdapter<S>,
    rules: IngestRules,
    sink: K,
    stats: PipelineStats,
    progress: ProgressLog,
}

impl<S: StateStore, K: ResultSink> Pipeline<S, K> {
    /// Create a pipeline
    pub fn new(config: PipelineConfig, store: S, sink: K) -> Result<Self> {
        config.validate()?;
        let adapter = ScoringAdapter::new(store, config.detector)?
            .persist_on_discard(config.persist_on_discard);
        Ok(Self {
            adapter,
            rules: config.ingest,
            sink,
            stats: PipelineStats::default(),
            progress: ProgressLog::new(config.log_every),
        })
    }

    /// Parse and process one input line. Returns the number of results
    /// emitted. Blank lines and `#` comments are ignored.
    pub fn process_line(&mut self, line: &str) -> Result<usize> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(0);
        }

        let record = match parse(line) {
            Ok(record) => record,
            Err(e) => {
                self.stats.malformed_records += 1;
                warn!(error = %e, "Malformed record");
                return Err(e.into());
            }
        };
        self.process_record(&record)
    }

    /// Process one parsed record
    pub fn process_record(&mut self, record: &LineRecord) -> Result<usize> {
        self.stats.records_read += 1;

        let observations = self.rules.observations(record, Utc::now());
        if observations.is_empty() {
            self.stats.records_skipped += 1;
            debug!(measurement = %record.measurement, "No observation in record");
        }

        let mut emitted = 0;
        let mut first_error = None;
        for observation in &observations {
            match self.process_observation(observation) {
                Ok(_) => emitted += 1,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        let last_collected = observations.last().map(|o| o.collected_at);
        if self.progress.tick(last_collected.as_ref()) {
            self.sink.flush()?;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(emitted),
        }
    }

    /// Score one observation and emit the result
    pub fn process_observation(&mut self, observation: &Observation) -> Result<ScoreRecord> {
        let scored = match self.adapter.score(
            &observation.key,
            observation.value,
            observation.timestamp(),
        ) {
            Ok(scored) => scored,
            Err(e) => {
                self.stats.failures += 1;
                warn!(key = %observation.key, error = %e, "Scoring failed");
                return Err(e);
            }
        };
        self.stats.record(&scored);

        let record = ScoreRecord::new(observation, &scored, Utc::now());
        if record.is_anomaly {
            info!(
                key = %record.key,
                value = record.value,
                score = record.score,
                "Anomaly detected"
            );
        }

        if let Err(e) = self.sink.emit(&record) {
            self.stats.failures += 1;
            warn!(key = %observation.key, error = %e, "Emit failed");
            return Err(e.into());
        }
        Ok(record)
    }

    /// Flush the sink
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    /// Counters so far
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// The scoring adapter
    pub fn adapter(&self) -> &ScoringAdapter<S> {
        &self.adapter
    }

    /// The sink
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Mutable access to the sink
    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    /// Consume the pipeline and return the sink
    pub fn into_sink(self) -> K {
        self.sink
    }
}

impl<S, K> std::fmt::Debug for Pipeline<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("rules", &self.rules)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::sink::MemorySink;
    use crate::store::MemoryStore;
    use rarity::{DetectorConfig, Period};

    fn pipeline() -> Pipeline<MemoryStore, MemorySink> {
        let config = PipelineConfig::with_detector(DetectorConfig::default().prob_period(0));
        Pipeline::new(config, MemoryStore::new(), MemorySink::new()).unwrap()
    }

    fn disk(value: f64, secs: i64) -> String {
        format!(
            "disk,path=/data,host=db1 used_percent={} {}",
            value,
            secs * 1_000_000_000
        )
    }

    #[test]
    fn test_process_line_scores_disk() {
        let mut pipeline = pipeline();
        assert_eq!(pipeline.process_line(&disk(10.0, 0)).unwrap(), 1);
        assert_eq!(pipeline.process_line(&disk(90.0, 1)).unwrap(), 1);

        let records = pipeline.sink().records();
        assert_eq!(records[1].key, "dbaas.disk.used_percent.db1");
        assert_eq!(records[1].score, 100.0);
        assert!(records[1].is_anomaly);
        assert_eq!(pipeline.stats().anomalies, 1);
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let mut pipeline = pipeline();
        assert_eq!(pipeline.process_line("").unwrap(), 0);
        assert_eq!(pipeline.process_line("# header").unwrap(), 0);
        assert_eq!(pipeline.stats().records_read, 0);
    }

    #[test]
    fn test_malformed_line_counted() {
        let mut pipeline = pipeline();
        let err = pipeline.process_line("disk used_percent=").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord(_)));
        assert_eq!(pipeline.stats().malformed_records, 1);
    }

    #[test]
    fn test_unmatched_record_skipped() {
        let mut pipeline = pipeline();
        assert_eq!(pipeline.process_line("mem,host=db1 used=1 1").unwrap(), 0);
        assert_eq!(pipeline.stats().records_skipped, 1);
        assert!(pipeline.sink().is_empty());
    }

    #[test]
    fn test_order_violation_emitted_not_persisted() {
        let mut pipeline = pipeline();
        pipeline.process_line(&disk(10.0, 5)).unwrap();
        pipeline.process_line(&disk(90.0, 4)).unwrap();

        let records = pipeline.sink().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].period, Period::OrderViolation);
        assert_eq!(records[1].score, 0.0);
        assert_eq!(pipeline.stats().order_violations, 1);
        assert_eq!(pipeline.stats().states_persisted, 1);
    }

    #[test]
    fn test_sub_second_timestamps_share_a_second() {
        let mut pipeline = pipeline();
        pipeline
            .process_line("disk,path=/data,host=db1 used_percent=10 1000000000900000000")
            .unwrap();
        pipeline
            .process_line("disk,path=/data,host=db1 used_percent=90 1000000000100000000")
            .unwrap();
        assert_ne!(pipeline.sink().records()[1].period, Period::OrderViolation);
    }

    #[test]
    fn test_corrupt_state_counted_as_failure() {
        let store = MemoryStore::new();
        store.set("dbaas.disk.used_percent.db1", b"junk").unwrap();
        let mut pipeline =
            Pipeline::new(PipelineConfig::default(), store, MemorySink::new()).unwrap();

        assert!(pipeline.process_line(&disk(10.0, 0)).is_err());
        assert_eq!(pipeline.stats().failures, 1);
        assert!(pipeline.sink().is_empty());
    }
}
