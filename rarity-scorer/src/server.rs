// Rarity Scorer - HTTP surface
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! HTTP endpoints: Prometheus metrics, health, readiness and status.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::metrics::encode_metrics;
use crate::replay::{DatasetInfo, ReplayState};

/// Live counters shared between the workers and the HTTP handlers
#[derive(Debug, Default)]
pub struct ServiceStatus {
    pub records_read: AtomicU64,
    pub observations_scored: AtomicU64,
    pub anomalies: AtomicU64,
    pub failures: AtomicU64,
    /// Workers are running and accepting observations
    pub ready: AtomicBool,
    /// Input has been fully consumed
    pub input_done: AtomicBool,
}

/// Application state shared across handlers.
pub struct AppState {
    pub status: Arc<ServiceStatus>,
    pub replay_state: Option<Arc<ReplayState>>,
    pub dataset_info: Option<DatasetInfo>,
    pub workers: usize,
    pub start_time: Instant,
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Rarity Scorer</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>Rarity Scorer</h1>
    <p>Windowed occurrence anomaly scoring for keyed metric streams.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div><a href="/health">/health</a> - Health check</div>
        <div><a href="/ready">/ready</a> - Readiness check</div>
        <div><a href="/status">/status</a> - Status information (JSON)</div>
    </div>

    <h2>Metrics</h2>
    <ul>
        <li><code>rarity_observations_total</code> - Scored observations by period</li>
        <li><code>rarity_anomalies_total</code> - Flagged observations</li>
        <li><code>rarity_order_violations_total</code> - Late observations discarded</li>
        <li><code>rarity_last_score</code> - Last score per key</li>
        <li><code>rarity_pattern_count</code> - Patterns held per key</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = encode_metrics();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.status.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
    }
}

/// Status information response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub workers: usize,
    pub records_read: u64,
    pub observations_scored: u64,
    pub anomalies: u64,
    pub failures: u64,
    pub input_done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplayStatus>,
}

/// Replay status information.
#[derive(Debug, Serialize)]
pub struct ReplayStatus {
    pub running: bool,
    pub position: usize,
    pub total_rows: usize,
    pub progress_percent: f64,
    pub key_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ns: Option<i64>,
}

/// Snapshot the status counters.
pub fn status_response(state: &AppState) -> StatusResponse {
    let replay = state.replay_state.as_ref().map(|replay_state| {
        let position = replay_state.position.load(Ordering::SeqCst);
        let total = replay_state.total_rows.load(Ordering::SeqCst);
        let progress = if total > 0 {
            (position as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        ReplayStatus {
            running: replay_state.running.load(Ordering::SeqCst),
            position,
            total_rows: total,
            progress_percent: progress,
            key_count: state.dataset_info.as_ref().map(|i| i.key_count).unwrap_or(0),
            duration_ns: state.dataset_info.as_ref().map(|i| i.duration_ns),
        }
    });

    let status = &state.status;
    StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        workers: state.workers,
        records_read: status.records_read.load(Ordering::Relaxed),
        observations_scored: status.observations_scored.load(Ordering::Relaxed),
        anomalies: status.anomalies.load(Ordering::Relaxed),
        failures: status.failures.load(Ordering::Relaxed),
        input_done: status.input_done.load(Ordering::SeqCst),
        replay,
    }
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(status_response(&state))
}
