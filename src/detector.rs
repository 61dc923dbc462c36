//! Windowed occurrence detector
//!
//! The detector normalizes each value into a bucket, keeps the last
//! `memory_window` buckets as the current pattern, and scores the pattern by
//! how rarely it has occurred before: a never-seen pattern scores 100, a
//! pattern seen `n` times scores `100 / n`.
//!
//! A never-seen pattern outside an active cooldown arms a rest countdown of
//! `rest_period` calls. While the countdown runs, every score is divided by
//! the remaining countdown, which suppresses bursts of alerts for one
//! sustained condition.
//!
//! The detector performs no I/O. Its whole state is an owned value that can be
//! encoded with [`crate::codec`] and resumed later.

use crate::config::DetectorConfig;
use crate::error::Result;
use crate::pattern::{Bucket, PatternCounts};
use crate::period::Period;

/// Timestamp of an observation. Any monotonic unit works as long as it is
/// used consistently for a key.
pub type Timestamp = i64;

/// Minimum score for an anomaly.
pub const ANOMALY_THRESHOLD: f64 = 100.0;

/// Score returned while there is nothing meaningful to report.
pub const NEUTRAL_SCORE: f64 = 0.0;

/// Outcome of one scoring call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreResult {
    /// Anomaly score in `[0, 100]`
    pub score: f64,
    /// Period the detector was in for this call
    pub period: Period,
    /// Whether the score should be flagged
    pub is_anomaly: bool,
}

impl ScoreResult {
    fn new(score: f64, period: Period) -> Self {
        Self {
            score,
            period,
            is_anomaly: is_anomaly(score, period),
        }
    }
}

/// Whether `score` in `period` is an anomaly.
///
/// Training and discarded observations are never flagged.
pub fn is_anomaly(score: f64, period: Period) -> bool {
    score >= ANOMALY_THRESHOLD && period.is_alert_eligible()
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mutable part of a detector, persisted between observations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorState {
    /// Timestamp of the last accepted observation
    pub last_input_time: Option<Timestamp>,
    /// Observations counted towards the training volume
    pub observed_count: u64,
    /// Last buckets, oldest first
    pub recent_window: Vec<Bucket>,
    /// Occurrences per pattern
    pub pattern_counts: PatternCounts,
    /// Remaining dampened calls
    pub rest_countdown: u32,
    /// Period of the last call
    pub period: Period,
}

impl DetectorState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one observation against `config`, updating the state in place.
    ///
    /// Never panics, even for a configuration that fails
    /// [`DetectorConfig::validate`]: a zero window or bucket count is
    /// floored at one.
    pub fn score(&mut self, config: &DetectorConfig, value: f64, timestamp: Timestamp) -> ScoreResult {
        if let Some(last) = self.last_input_time {
            if timestamp < last {
                #[cfg(feature = "logging")]
                log::debug!("discarding observation at {} older than {}", timestamp, last);
                self.period = Period::OrderViolation;
                return ScoreResult::new(NEUTRAL_SCORE, self.period);
            }
        }
        self.last_input_time = Some(timestamp);

        if self.observed_count <= config.prob_period {
            self.observed_count += 1;
            self.period = Period::Training;
        } else {
            self.period = Period::Regular;
        }

        self.recent_window.push(config.bucket(value));
        // An unvalidated zero window still scores one bucket at a time
        let window_len = (config.memory_window as usize).max(1);
        if self.recent_window.len() < window_len {
            return ScoreResult::new(NEUTRAL_SCORE, self.period);
        }

        let occurrences = self.pattern_counts.record(&self.recent_window);
        let raw_score = round2(ANOMALY_THRESHOLD / occurrences as f64);
        let final_score = self.apply_cooldown(config, raw_score);

        // Drop the oldest bucket; restored states may hold a longer window
        // if memory_window shrank, so trim down to window_len - 1.
        let excess = self.recent_window.len() + 1 - window_len;
        self.recent_window.drain(..excess);

        ScoreResult::new(final_score, self.period)
    }

    fn apply_cooldown(&mut self, config: &DetectorConfig, raw_score: f64) -> f64 {
        if self.rest_countdown > 0 {
            let dampened = round2(raw_score / f64::from(self.rest_countdown));
            self.rest_countdown -= 1;
            if self.period == Period::Regular {
                self.period = Period::Rest;
            }
            dampened
        } else {
            if raw_score >= ANOMALY_THRESHOLD {
                #[cfg(feature = "logging")]
                log::debug!("novel pattern, arming cooldown of {} calls", config.rest_period);
                self.rest_countdown = config.rest_period;
            }
            raw_score
        }
    }
}

/// A configured detector for one stream
#[derive(Debug, Clone, PartialEq)]
pub struct Detector {
    config: DetectorConfig,
    state: DetectorState,
}

impl Detector {
    /// Create a detector with the default configuration
    pub fn new() -> Self {
        Self {
            config: DetectorConfig::default(),
            state: DetectorState::new(),
        }
    }

    /// Create a detector with a custom configuration
    pub fn with_config(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: DetectorState::new(),
        })
    }

    /// Reassemble a detector from persisted parts
    pub fn from_parts(config: DetectorConfig, state: DetectorState) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, state })
    }

    /// Split into configuration and state
    pub fn into_parts(self) -> (DetectorConfig, DetectorState) {
        (self.config, self.state)
    }

    /// Score one observation
    pub fn score(&mut self, value: f64, timestamp: Timestamp) -> ScoreResult {
        self.state.score(&self.config, value, timestamp)
    }

    /// Get the configuration
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Get the state
    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Period of the last call
    pub fn period(&self) -> Period {
        self.state.period
    }

    /// Timestamp of the last accepted observation
    pub fn last_input_time(&self) -> Option<Timestamp> {
        self.state.last_input_time
    }

    /// Observations counted towards training
    pub fn observed_count(&self) -> u64 {
        self.state.observed_count
    }

    /// Remaining dampened calls
    pub fn rest_countdown(&self) -> u32 {
        self.state.rest_countdown
    }

    /// Number of distinct patterns seen so far
    pub fn pattern_count(&self) -> usize {
        self.state.pattern_counts.len()
    }

    /// Estimate memory usage in bytes
    pub fn estimated_memory(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.state.recent_window.capacity() * std::mem::size_of::<Bucket>()
            + self.state.pattern_counts.estimated_memory()
    }

    /// Forget everything learned while keeping the configuration.
    pub fn reset(&mut self) {
        self.state = DetectorState::new();
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}
