// Rarity Scorer - Partitioned scoring workers
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Partitioned scoring workers.
//!
//! Observations are routed by key to one of N workers. Each worker owns a
//! [`Pipeline`] and scores its keys sequentially, so no key is ever scored
//! concurrently. Results from every worker go through a channel to a single
//! writer.

use std::io::{BufRead, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use rarity_pipeline::{
    parse, IngestRules, LineSink, Observation, Partitioner, Pipeline, PipelineConfig,
    PipelineStats, ProgressLog, ResultSink, ScoreRecord, SinkError, StateStore,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::server::ServiceStatus;

/// Observations queued per worker before ingestion waits
pub const WORKER_QUEUE_SIZE: usize = 1024;

/// Store shared by all workers
pub type SharedStore = Arc<dyn StateStore>;

/// Forwards results to the writer task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ScoreRecord>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ScoreRecord>) -> Self {
        Self { tx }
    }
}

impl ResultSink for ChannelSink {
    fn emit(&mut self, record: &ScoreRecord) -> Result<(), SinkError> {
        self.tx.send(record.clone()).map_err(|_| SinkError::Closed)
    }
}

/// Every worker has stopped accepting observations
#[derive(Debug, Clone, Copy)]
pub struct WorkersClosed;

/// Routes observations to the worker owning their key
#[derive(Debug, Clone)]
pub struct Router {
    partitioner: Partitioner,
    senders: Vec<mpsc::Sender<Observation>>,
}

impl Router {
    /// Number of workers
    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Queue an observation from async code
    pub async fn route(&self, observation: Observation) -> Result<(), WorkersClosed> {
        let partition = self.partitioner.partition_for(&observation.key);
        self.senders[partition]
            .send(observation)
            .await
            .map_err(|_| WorkersClosed)
    }

    /// Queue an observation from a blocking thread
    pub fn blocking_route(&self, observation: Observation) -> Result<(), WorkersClosed> {
        let partition = self.partitioner.partition_for(&observation.key);
        self.senders[partition]
            .blocking_send(observation)
            .map_err(|_| WorkersClosed)
    }
}

/// Spawn one scoring worker per partition.
///
/// Workers stop once the returned [`Router`] and all its clones are dropped,
/// returning their counters.
pub fn spawn_workers(
    workers: usize,
    config: &PipelineConfig,
    store: SharedStore,
    results: mpsc::UnboundedSender<ScoreRecord>,
    status: Arc<ServiceStatus>,
) -> rarity_pipeline::Result<(Router, Vec<JoinHandle<PipelineStats>>)> {
    let partitioner = Partitioner::new(workers)?;

    let mut senders = Vec::with_capacity(workers);
    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let (tx, rx) = mpsc::channel(WORKER_QUEUE_SIZE);
        let pipeline = Pipeline::new(
            config.clone(),
            Arc::clone(&store),
            ChannelSink::new(results.clone()),
        )?;
        let status = Arc::clone(&status);
        handles.push(tokio::task::spawn_blocking(move || {
            run_worker(id, pipeline, rx, &status)
        }));
        senders.push(tx);
    }

    info!("Started {} scoring workers", workers);
    Ok((
        Router {
            partitioner,
            senders,
        },
        handles,
    ))
}

fn run_worker(
    id: usize,
    mut pipeline: Pipeline<SharedStore, ChannelSink>,
    mut rx: mpsc::Receiver<Observation>,
    status: &ServiceStatus,
) -> PipelineStats {
    debug!(worker = id, "Worker started");
    while let Some(observation) = rx.blocking_recv() {
        match pipeline.process_observation(&observation) {
            Ok(record) => {
                metrics::record_score(&record);
                status.observations_scored.fetch_add(1, Ordering::Relaxed);
                if record.is_anomaly {
                    status.anomalies.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(_) => {
                metrics::record_failure();
                status.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    debug!(worker = id, "Worker stopped");
    *pipeline.stats()
}

/// Read line protocol records, expand them and route the observations.
///
/// Returns ingestion counters when the input ends or the workers close.
pub fn ingest_lines<R: BufRead>(
    mut reader: R,
    rules: &IngestRules,
    router: &Router,
    log_every: u64,
    status: &ServiceStatus,
) -> std::io::Result<PipelineStats> {
    let mut stats = PipelineStats::default();
    let mut progress = ProgressLog::new(log_every);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }

        // Invalid UTF-8 is one malformed record, not the end of the input
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                stats.malformed_records += 1;
                metrics::record_malformed();
                warn!(error = %e, "Malformed record");
                continue;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let record = match parse(line) {
            Ok(record) => record,
            Err(e) => {
                stats.malformed_records += 1;
                metrics::record_malformed();
                warn!(error = %e, "Malformed record");
                continue;
            }
        };

        stats.records_read += 1;
        status.records_read.fetch_add(1, Ordering::Relaxed);

        let observations = rules.observations(&record, Utc::now());
        let skipped = observations.is_empty();
        if skipped {
            stats.records_skipped += 1;
        }
        metrics::record_input(skipped);

        let last_collected = observations.last().map(|o| o.collected_at);
        for observation in observations {
            if router.blocking_route(observation).is_err() {
                warn!("Scoring workers stopped, ending ingestion");
                return Ok(stats);
            }
        }
        progress.tick(last_collected.as_ref());
    }

    Ok(stats)
}

/// Drain results into a line sink until every worker is done.
pub fn write_results<W: Write>(
    mut rx: mpsc::UnboundedReceiver<ScoreRecord>,
    mut sink: LineSink<W>,
) -> Result<u64, SinkError> {
    while let Some(record) = rx.blocking_recv() {
        sink.emit(&record)?;
        // Flush when idle so streaming consumers see results promptly
        if rx.is_empty() {
            sink.flush()?;
        }
    }
    sink.flush()?;
    Ok(sink.written())
}
