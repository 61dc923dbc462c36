// Rarity Scorer - Streaming anomaly scoring service
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! # Rarity Scorer
//!
//! Scores line protocol metric streams with one windowed occurrence detector
//! per key, writes `anomaly_score` records and exposes Prometheus metrics.
//!
//! ## Usage
//!
//! ```bash
//! # Score stdin, write results to stdout
//! telegraf --test | rarity-scorer
//!
//! # Persist detector state between runs and serve metrics
//! rarity-scorer --input metrics.lp --output scores.lp --state-dir ./state --port 9100
//!
//! # Replay a recorded dataset at 60x
//! rarity-scorer --csv dataset.csv --speed 60
//! ```

mod metrics;
mod replay;
mod server;
mod worker;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use rarity_pipeline::{
    FileStore, LineSink, MemoryStore, PipelineConfig, PipelineError, PipelineStats, StoreError,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use replay::{ReplayConfig, ReplayEngine, ReplayError};
use server::{AppState, ServiceStatus};
use worker::{ingest_lines, spawn_workers, write_results, SharedStore};

/// Rarity anomaly scoring service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Line protocol input file (default: stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// CSV dataset to replay instead of line protocol input
    #[arg(short, long, conflicts_with = "input")]
    csv: Option<PathBuf>,

    /// Replay speed multiplier (1.0 = real-time, 0 = unpaced)
    #[arg(short, long, default_value = "1.0")]
    speed: f64,

    /// Output file for scored records (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for persisted detector state (default: in-memory)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Number of scoring workers
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Port for the HTTP metrics server (disabled when absent)
    #[arg(short, long)]
    port: Option<u16>,

    /// Keep serving HTTP after the input ends, until interrupted
    #[arg(long)]
    keep_serving: bool,

    /// JSON pipeline configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Records between progress lines (overrides the configuration)
    #[arg(long)]
    log_every: Option<u64>,

    /// Write state back after out-of-order observations
    #[arg(long)]
    persist_on_discard: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Fatal service errors.
#[derive(Debug, Error)]
enum ScorerError {
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("State store: {0}")]
    Store(#[from] StoreError),

    #[error("Replay: {0}")]
    Replay(#[from] ReplayError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Result writer: {0}")]
    Sink(#[from] rarity_pipeline::SinkError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing; logs go to stderr so stdout carries results
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!("Rarity Scorer v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(stats) => {
            info!(
                "Done: {} records read, {} observations scored, {} anomalies, {} order violations, {} failures",
                stats.records_read,
                stats.observations_scored,
                stats.anomalies,
                stats.order_violations,
                stats.failures
            );
            if stats.failures > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Build the pipeline configuration from the file and flags.
fn load_config(args: &Args) -> Result<PipelineConfig, ScorerError> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(log_every) = args.log_every {
        config.log_every = log_every;
    }
    if args.persist_on_discard {
        config.persist_on_discard = true;
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<PipelineStats, ScorerError> {
    let config = load_config(&args)?;

    let store: SharedStore = match &args.state_dir {
        Some(dir) => {
            info!("Persisting state under {}", dir.display());
            Arc::new(FileStore::open(dir)?)
        }
        None => {
            info!("Keeping state in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let output: Box<dyn Write + Send> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    // Results from every worker funnel into one writer
    let (result_tx, result_rx) = mpsc::unbounded_channel();
    let writer = tokio::task::spawn_blocking(move || write_results(result_rx, LineSink::new(output)));

    let status = Arc::new(ServiceStatus::default());
    let (router, workers) = spawn_workers(
        args.workers,
        &config,
        store,
        result_tx,
        Arc::clone(&status),
    )?;
    status.ready.store(true, Ordering::SeqCst);

    // Load the replay dataset before serving so /status can describe it
    let replay = match &args.csv {
        Some(csv_path) => Some(ReplayEngine::from_csv(ReplayConfig {
            csv_path: csv_path.clone(),
            speed: args.speed,
        })?),
        None => None,
    };

    let server = match args.port {
        Some(port) => {
            let state = Arc::new(AppState {
                status: Arc::clone(&status),
                replay_state: replay.as_ref().map(|r| r.state()),
                dataset_info: replay.as_ref().map(|r| r.dataset_info()),
                workers: router.workers(),
                start_time: Instant::now(),
            });
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = TcpListener::bind(addr).await?;
            info!("Starting server on http://{}", addr);
            info!("Metrics endpoint: http://{}/metrics", addr);
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, server::router(state)).await {
                    error!("HTTP server failed: {}", e);
                }
            }))
        }
        None => None,
    };

    let mut stats = match replay {
        Some(engine) => {
            let sent = engine.run(&router, &status).await;
            drop(router);
            PipelineStats {
                records_read: sent as u64,
                ..Default::default()
            }
        }
        None => {
            let rules = config.ingest.clone();
            let log_every = config.log_every;
            let input = args.input.clone();
            let ingest_status = Arc::clone(&status);
            tokio::task::spawn_blocking(move || {
                let result = match input {
                    Some(path) => {
                        info!("Reading {}", path.display());
                        File::open(&path).and_then(|file| {
                            ingest_lines(BufReader::new(file), &rules, &router, log_every, &ingest_status)
                        })
                    }
                    None => {
                        info!("Reading stdin");
                        let stdin = io::stdin();
                        ingest_lines(stdin.lock(), &rules, &router, log_every, &ingest_status)
                    }
                };
                // Dropping the router lets the workers drain and stop
                drop(router);
                result
            })
            .await??
        }
    };
    status.input_done.store(true, Ordering::SeqCst);

    for handle in workers {
        stats.merge(&handle.await?);
    }

    let written = writer.await??;
    info!("Wrote {} scored records", written);

    if let Some(server) = server {
        if args.keep_serving {
            info!("Input finished, serving until interrupted");
            tokio::signal::ctrl_c().await?;
        }
        server.abort();
    }

    Ok(stats)
}
