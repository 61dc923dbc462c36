//! # Rarity - Windowed occurrence anomaly scoring
//!
//! Real-time anomaly scores for keyed streams of scalar observations, one
//! independent detector per monitored signal (a host/metric pair, a sensor).
//!
//! ## Key Features
//!
//! - **Occurrence scoring**: Recent local patterns that were rarely seen score high
//! - **Cooldown**: A novel pattern dampens the following scores
//! - **Training period**: Early scores are computed but never flagged
//! - **Portable state**: A detector encodes to bytes and resumes exactly
//!
//! ## Quick Start
//!
//! ```rust
//! use rarity::{Detector, DetectorConfig, Period};
//!
//! let config = DetectorConfig::default().prob_period(0);
//! let mut detector = Detector::with_config(config).unwrap();
//!
//! // The first call only fills the window
//! assert_eq!(detector.score(10.0, 0).score, 0.0);
//!
//! // A never-seen pattern scores the maximum
//! let result = detector.score(90.0, 1);
//! assert_eq!(result.score, 100.0);
//! assert_eq!(result.period, Period::Regular);
//! assert!(result.is_anomaly);
//!
//! // Persist between observations
//! let bytes = detector.to_bytes();
//! let mut restored = Detector::from_bytes(&bytes).unwrap();
//! assert_eq!(restored.score(10.0, 2), detector.score(10.0, 2));
//! ```
//!
//! ## Modules
//!
//! - [`detector`]: The scoring state machine
//! - [`config`]: Detector parameters and normalization
//! - [`pattern`]: Occurrence counters per exact pattern
//! - [`period`]: Period classification and alert eligibility
//! - [`codec`]: Binary state encoding for external stores

// Modules
pub mod codec;
pub mod config;
pub mod detector;
pub mod error;
pub mod pattern;
pub mod period;

// Re-exports for convenient access
pub use config::DetectorConfig;
pub use detector::{
    is_anomaly, round2, Detector, DetectorState, ScoreResult, Timestamp, ANOMALY_THRESHOLD,
    NEUTRAL_SCORE,
};
pub use error::{ConfigError, DecodeError, RarityError, Result};
pub use pattern::{Bucket, PatternCounts};
pub use period::Period;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
