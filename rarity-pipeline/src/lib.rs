// Rarity Pipeline - Keyed scoring over line protocol streams
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! # Rarity Pipeline - Keyed scoring over line protocol streams
//!
//! This crate connects [`rarity`] detectors to a stream of line protocol
//! records, an external state store and a result sink.
//!
//! ## Features
//!
//! - **Ingestion rules**: Select measurements and fields, derive detector keys
//! - **Pluggable state**: In-memory or file-backed stores, anything implementing [`StateStore`]
//! - **Line protocol output**: Results encoded as `anomaly_score` records
//! - **Single-writer partitioning**: Stable key to worker routing
//!
//! ## Quick Start
//!
//! ```rust
//! use rarity_pipeline::{MemorySink, MemoryStore, Pipeline, PipelineConfig};
//!
//! let mut pipeline = Pipeline::new(
//!     PipelineConfig::default(),
//!     MemoryStore::new(),
//!     MemorySink::new(),
//! ).unwrap();
//!
//! pipeline
//!     .process_line("disk,path=/data,host=db1 used_percent=42.5 1700000000000000000")
//!     .unwrap();
//!
//! let record = &pipeline.sink().records()[0];
//! assert_eq!(record.key, "dbaas.disk.used_percent.db1");
//! assert_eq!(record.score, 0.0);
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   line ──► parse ──► IngestRules ──► Observation
//!                                          │
//!                                          ▼
//!                     StateStore ◄──► ScoringAdapter ──► ResultSink
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod ingest;
pub mod line;
pub mod partition;
pub mod pipeline;
pub mod sink;
pub mod stats;
pub mod store;

pub use adapter::{Scored, ScoringAdapter};
pub use config::PipelineConfig;
pub use error::{LineError, PipelineError, Result, SinkError, StoreError};
pub use ingest::{IngestRule, IngestRules, Observation, TagFilter};
pub use line::{encode_record, parse, FieldValue, LineRecord};
pub use partition::Partitioner;
pub use pipeline::Pipeline;
pub use sink::{LineSink, MemorySink, ResultSink, ScoreRecord};
pub use stats::{PipelineStats, ProgressLog};
pub use store::{FileStore, MemoryStore, StateStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_builds() {
        let pipeline = Pipeline::new(
            PipelineConfig::default(),
            MemoryStore::new(),
            MemorySink::new(),
        );
        assert!(pipeline.is_ok());
    }
}
