//! Error types for Rarity
//!
//! The scoring engine itself never fails: every observation yields a score.
//! Errors only arise when validating a configuration or when decoding a
//! persisted detector state.

use thiserror::Error;

/// Result type alias for Rarity operations
pub type Result<T> = std::result::Result<T, RarityError>;

/// Main error type for Rarity operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RarityError {
    /// Decoding a persisted detector state failed
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Detector configuration is unusable
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors while decoding a persisted detector state
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Buffer ends before the declared content
    #[error("Buffer too short: need at least {needed} bytes, got {available}")]
    BufferTooShort { needed: usize, available: usize },

    /// Leading magic bytes do not identify a detector state
    #[error("Invalid magic bytes: {0:02x?}")]
    InvalidMagic([u8; 4]),

    /// State was written by an unknown format version
    #[error("Unsupported state format version: {0}")]
    UnsupportedVersion(u16),

    /// Stored checksum does not match the content
    #[error("Invalid checksum: expected {expected:08x}, got {actual:08x}")]
    InvalidChecksum { expected: u32, actual: u32 },

    /// Content is structurally wrong
    #[error("Malformed state at offset {offset}: {reason}")]
    MalformedState { offset: usize, reason: String },
}

/// Errors in a detector configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Bucket count must be positive
    #[error("norm_value must be greater than zero")]
    ZeroNormValue,

    /// A pattern needs at least one observation
    #[error("memory_window must be greater than zero")]
    ZeroMemoryWindow,

    /// Range bounds are swapped
    #[error("Inverted range: min {min} is greater than max {max}")]
    InvertedRange { min: f64, max: f64 },

    /// Range bound is NaN or infinite
    #[error("Range bound is not finite: {0}")]
    NonFiniteBound(f64),
}
