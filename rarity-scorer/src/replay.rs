// Rarity Scorer - Dataset replay engine
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Dataset replay engine for scoring recorded observations from CSV files.
//!
//! The dataset has a `timestamp_ns,key,value` header and an optional `host`
//! column. Rows are replayed in file order, paced by their timestamps.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rarity_pipeline::line::NANOS_PER_SECOND;
use rarity_pipeline::Observation;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::metrics::{record_input, update_replay_metrics};
use crate::server::ServiceStatus;
use crate::worker::Router;

/// Longest pause between two rows, whatever the timestamp gap.
const MAX_PACING_DELAY: Duration = Duration::from_secs(5);

/// Configuration for dataset replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Path to CSV dataset file.
    pub csv_path: PathBuf,
    /// Replay speed multiplier (1.0 = real-time, 0 = as fast as possible).
    pub speed: f64,
}

/// State of the replay engine.
#[derive(Debug, Default)]
pub struct ReplayState {
    /// Current position in the dataset (row index).
    pub position: AtomicUsize,
    /// Total rows in the dataset.
    pub total_rows: AtomicUsize,
    /// Whether replay is running.
    pub running: AtomicBool,
}

/// Summary of a loaded dataset.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub row_count: usize,
    pub key_count: usize,
    /// Span between the first and last timestamps.
    pub duration_ns: i64,
}

/// Dataset row for replay.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct DataRow {
    timestamp_ns: i64,
    key: String,
    value: f64,
    #[serde(default)]
    host: String,
}

/// Replay engine that feeds a dataset through the scoring workers.
pub struct ReplayEngine {
    config: ReplayConfig,
    state: Arc<ReplayState>,
    rows: Vec<DataRow>,
}

impl ReplayEngine {
    /// Create a new replay engine from a CSV file.
    pub fn from_csv(config: ReplayConfig) -> Result<Self, ReplayError> {
        if !config.csv_path.exists() {
            return Err(ReplayError::FileNotFound(config.csv_path.clone()));
        }
        if !(config.speed >= 0.0 && config.speed.is_finite()) {
            return Err(ReplayError::InvalidFormat(format!(
                "speed must be a finite non-negative number, got {}",
                config.speed
            )));
        }

        let rows = Self::parse_csv(&config.csv_path)?;
        if rows.is_empty() {
            return Err(ReplayError::EmptyDataset);
        }

        let state = Arc::new(ReplayState::default());
        state.total_rows.store(rows.len(), Ordering::SeqCst);

        let engine = Self {
            config,
            state,
            rows,
        };
        let info = engine.dataset_info();
        info!(
            "Loaded dataset: {} keys, {} rows",
            info.key_count, info.row_count
        );
        Ok(engine)
    }

    /// Parse a CSV file into data rows.
    fn parse_csv(path: &Path) -> Result<Vec<DataRow>, ReplayError> {
        let mut reader = csv::Reader::from_path(path)?;

        let headers = reader.headers()?.clone();
        for required in ["timestamp_ns", "key", "value"] {
            if !headers.iter().any(|h| h == required) {
                return Err(ReplayError::InvalidFormat(format!(
                    "missing '{}' column",
                    required
                )));
            }
        }

        let mut rows = Vec::new();
        for result in reader.deserialize() {
            let row: DataRow = result?;
            if !row.value.is_finite() {
                debug!(key = %row.key, "Skipping non-finite value");
                continue;
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Get the replay state handle.
    pub fn state(&self) -> Arc<ReplayState> {
        Arc::clone(&self.state)
    }

    /// Summarize the dataset.
    pub fn dataset_info(&self) -> DatasetInfo {
        let keys: HashSet<&str> = self.rows.iter().map(|r| r.key.as_str()).collect();
        let first = self.rows.first().map(|r| r.timestamp_ns).unwrap_or(0);
        let last = self.rows.last().map(|r| r.timestamp_ns).unwrap_or(0);
        DatasetInfo {
            row_count: self.rows.len(),
            key_count: keys.len(),
            duration_ns: last.saturating_sub(first),
        }
    }

    /// Pause before a row, given the previous row's timestamp.
    fn pacing_delay(&self, previous_ns: i64, current_ns: i64) -> Option<Duration> {
        if self.config.speed <= 0.0 || current_ns <= previous_ns {
            return None;
        }
        let gap_secs = (current_ns - previous_ns) as f64 / NANOS_PER_SECOND as f64;
        let delay = Duration::from_secs_f64(gap_secs / self.config.speed);
        Some(delay.min(MAX_PACING_DELAY))
    }

    /// Replay every row through the router. Returns the rows sent.
    pub async fn run(&self, router: &Router, status: &ServiceStatus) -> usize {
        self.state.running.store(true, Ordering::SeqCst);
        let total = self.rows.len();
        let mut previous_ns = None;
        let mut sent = 0;

        for (position, row) in self.rows.iter().enumerate() {
            if let Some(previous) = previous_ns {
                if let Some(delay) = self.pacing_delay(previous, row.timestamp_ns) {
                    sleep(delay).await;
                }
            }
            previous_ns = Some(row.timestamp_ns);

            record_input(false);
            status.records_read.fetch_add(1, Ordering::Relaxed);
            let Some(observation) = Observation::new(
                row.key.clone(),
                row.host.clone(),
                row.value,
                row.timestamp_ns,
                Utc::now(),
            ) else {
                warn!(key = %row.key, timestamp_ns = row.timestamp_ns, "Timestamp out of range");
                continue;
            };

            if router.route(observation).await.is_err() {
                warn!("Scoring workers stopped, ending replay");
                break;
            }
            sent += 1;

            self.state.position.store(position + 1, Ordering::SeqCst);
            update_replay_metrics(position + 1, total, self.config.speed);
        }

        self.state.running.store(false, Ordering::SeqCst);
        info!("Replay finished: {} of {} rows sent", sent, total);
        sent
    }
}

/// Replay errors.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn config(file: &NamedTempFile, speed: f64) -> ReplayConfig {
        ReplayConfig {
            csv_path: file.path().to_path_buf(),
            speed,
        }
    }

    #[test]
    fn test_parse_csv() {
        let file = create_test_csv(
            "timestamp_ns,key,value,host\n\
             1000000000,app.a,10.5,h1\n\
             2000000000,app.b,20,h2\n\
             3000000000,app.a,NaN,h1\n",
        );
        let engine = ReplayEngine::from_csv(config(&file, 0.0)).unwrap();
        let info = engine.dataset_info();
        assert_eq!(info.row_count, 2);
        assert_eq!(info.key_count, 2);
        assert_eq!(info.duration_ns, 1_000_000_000);
        assert_eq!(engine.rows[1].host, "h2");
    }

    #[test]
    fn test_host_column_optional() {
        let file = create_test_csv("key,value,timestamp_ns\napp.a,1,5\n");
        let engine = ReplayEngine::from_csv(config(&file, 0.0)).unwrap();
        assert_eq!(engine.rows[0].host, "");
        assert_eq!(engine.rows[0].timestamp_ns, 5);
    }

    #[test]
    fn test_missing_column() {
        let file = create_test_csv("time,key,value\n1,a,1\n");
        assert!(matches!(
            ReplayEngine::from_csv(config(&file, 0.0)),
            Err(ReplayError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_empty_dataset() {
        let file = create_test_csv("timestamp_ns,key,value\n");
        assert!(matches!(
            ReplayEngine::from_csv(config(&file, 0.0)),
            Err(ReplayError::EmptyDataset)
        ));
    }

    #[test]
    fn test_file_not_found() {
        let config = ReplayConfig {
            csv_path: PathBuf::from("/nonexistent/file.csv"),
            speed: 1.0,
        };
        assert!(matches!(
            ReplayEngine::from_csv(config),
            Err(ReplayError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_speed() {
        let file = create_test_csv("timestamp_ns,key,value\n1,a,1\n");
        assert!(ReplayEngine::from_csv(config(&file, -1.0)).is_err());
    }

    #[test]
    fn test_pacing_delay() {
        let file = create_test_csv("timestamp_ns,key,value\n1,a,1\n");
        let fast = ReplayEngine::from_csv(config(&file, 10.0)).unwrap();
        assert_eq!(
            fast.pacing_delay(0, 2_000_000_000),
            Some(Duration::from_millis(200))
        );
        assert_eq!(fast.pacing_delay(0, 3_600 * NANOS_PER_SECOND), Some(MAX_PACING_DELAY));
        assert_eq!(fast.pacing_delay(5, 5), None);

        let unpaced = ReplayEngine::from_csv(config(&file, 0.0)).unwrap();
        assert_eq!(unpaced.pacing_delay(0, 2_000_000_000), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_scores_rows() {
        use crate::worker::{spawn_workers, SharedStore};
        use rarity_pipeline::{MemoryStore, PipelineConfig};
        use tokio::sync::mpsc;

        let file = create_test_csv(
            "timestamp_ns,key,value\n\
             1000000000,app.a,10\n\
             2000000000,app.a,90\n\
             3000000000,app.b,50\n",
        );
        let engine = ReplayEngine::from_csv(config(&file, 0.0)).unwrap();

        let store: SharedStore = Arc::new(MemoryStore::new());
        let status = Arc::new(ServiceStatus::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (router, handles) = spawn_workers(
            2,
            &PipelineConfig::default(),
            store,
            tx,
            Arc::clone(&status),
        )
        .unwrap();

        assert_eq!(engine.run(&router, &status).await, 3);
        assert_eq!(status.records_read.load(Ordering::Relaxed), 3);
        drop(router);
        for handle in handles {
            handle.await.unwrap();
        }

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(engine.state().position.load(Ordering::SeqCst), 3);
        assert!(!engine.state().running.load(Ordering::SeqCst));
    }
}
