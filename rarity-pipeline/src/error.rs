// Rarity Pipeline - Keyed scoring over line protocol streams
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Error types for Rarity Pipeline

use thiserror::Error;

/// Failure of a state store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding the store was poisoned by a panicking writer
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Failure of a result sink
#[derive(Error, Debug)]
pub enum SinkError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The receiving side of the sink has gone away
    #[error("Sink closed")]
    Closed,
}

/// Failure to parse a line protocol record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// Line has no content
    #[error("Empty line")]
    Empty,

    /// Measurement name is empty
    #[error("Missing measurement")]
    MissingMeasurement,

    /// No field set after the measurement section
    #[error("Missing field set")]
    MissingFields,

    /// No timestamp after the field set
    #[error("Missing timestamp")]
    MissingTimestamp,

    /// Timestamp is not an integer
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Tag without `=` or with an empty key or value
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// Field without `=`, with an empty key, or an unparseable value
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// A quoted string field is not closed
    #[error("Unterminated string field")]
    UnterminatedString,

    /// More than three space separated sections
    #[error("Unexpected trailing content: {0}")]
    TrailingContent(String),
}

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// State could not be read or written
    #[error("State store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// A result could not be emitted
    #[error("Result sink unavailable: {0}")]
    SinkUnavailable(#[from] SinkError),

    /// Stored bytes for a key do not decode into a detector
    #[error("Corrupt state for key '{key}': {source}")]
    CorruptState {
        key: String,
        #[source]
        source: rarity::RarityError,
    },

    /// Input line could not be parsed
    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] LineError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<rarity::ConfigError> for PipelineError {
    fn from(err: rarity::ConfigError) -> Self {
        PipelineError::InvalidConfig(err.to_string())
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
