//! Detector configuration.
//!
//! A configuration is fixed when a key's detector is created and travels with
//! the persisted state, so later changes to the defaults never alter streams
//! that are already being scored.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default lower bound of the expected value range.
pub const DEFAULT_MIN_VALUE: f64 = 0.0;

/// Default upper bound of the expected value range.
pub const DEFAULT_MAX_VALUE: f64 = 100.0;

/// Default number of buckets the range is divided into.
pub const DEFAULT_NORM_VALUE: u32 = 7;

/// Default pattern length.
pub const DEFAULT_MEMORY_WINDOW: u32 = 2;

/// Default number of dampened calls after a novel pattern.
pub const DEFAULT_REST_PERIOD: u32 = 30;

/// Default number of training observations.
pub const DEFAULT_PROB_PERIOD: u64 = 1440;

/// Parameters of a windowed occurrence detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Expected minimum value.
    pub min_value: f64,

    /// Expected maximum value.
    pub max_value: f64,

    /// Number of buckets in `[min_value, max_value)`. Also the bucket width
    /// when the range is degenerate.
    pub norm_value: u32,

    /// Number of consecutive buckets forming one pattern.
    pub memory_window: u32,

    /// Number of calls dampened after a never-seen pattern.
    pub rest_period: u32,

    /// Number of observations classified as training.
    pub prob_period: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_value: DEFAULT_MIN_VALUE,
            max_value: DEFAULT_MAX_VALUE,
            norm_value: DEFAULT_NORM_VALUE,
            memory_window: DEFAULT_MEMORY_WINDOW,
            rest_period: DEFAULT_REST_PERIOD,
            prob_period: DEFAULT_PROB_PERIOD,
        }
    }
}

impl DetectorConfig {
    /// Create a configuration for a specific value range
    pub fn with_range(min_value: f64, max_value: f64) -> Self {
        Self {
            min_value,
            max_value,
            ..Default::default()
        }
    }

    /// Set the number of buckets
    pub fn norm_value(mut self, norm_value: u32) -> Self {
        self.norm_value = norm_value;
        self
    }

    /// Set the pattern length
    pub fn memory_window(mut self, memory_window: u32) -> Self {
        self.memory_window = memory_window;
        self
    }

    /// Set the cooldown length
    pub fn rest_period(mut self, rest_period: u32) -> Self {
        self.rest_period = rest_period;
        self
    }

    /// Set the training length
    pub fn prob_period(mut self, prob_period: u64) -> Self {
        self.prob_period = prob_period;
        self
    }

    /// Width of one bucket.
    ///
    /// A degenerate range (`max_value == min_value`) falls back to
    /// `norm_value` as the width so normalization stays defined. A zero
    /// `norm_value` counts as one bucket.
    pub fn bucket_width(&self) -> f64 {
        let norm_value = f64::from(self.norm_value.max(1));
        let mut full_range = self.max_value - self.min_value;
        if full_range == 0.0 {
            full_range = norm_value;
        }
        full_range / norm_value
    }

    /// Map a raw value to its bucket index.
    ///
    /// Values outside the configured range produce indices outside
    /// `[0, norm_value)`; they are not clamped. Non-finite values saturate.
    pub fn bucket(&self, value: f64) -> i64 {
        ((value - self.min_value) / self.bucket_width()).floor() as i64
    }

    /// Check that the configuration yields defined buckets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for bound in [self.min_value, self.max_value] {
            if !bound.is_finite() {
                return Err(ConfigError::NonFiniteBound(bound));
            }
        }
        if self.min_value > self.max_value {
            return Err(ConfigError::InvertedRange {
                min: self.min_value,
                max: self.max_value,
            });
        }
        if self.norm_value == 0 {
            return Err(ConfigError::ZeroNormValue);
        }
        if self.memory_window == 0 {
            return Err(ConfigError::ZeroMemoryWindow);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = DetectorConfig::default();
        assert_eq!(config.min_value, 0.0);
        assert_eq!(config.max_value, 100.0);
        assert_eq!(config.norm_value, 7);
        assert_eq!(config.memory_window, 2);
        assert_eq!(config.rest_period, 30);
        assert_eq!(config.prob_period, 1440);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bucket_default_range() {
        let config = DetectorConfig::default();
        assert_eq!(config.bucket(0.0), 0);
        assert_eq!(config.bucket(10.0), 0);
        assert_eq!(config.bucket(50.0), 3);
        assert_eq!(config.bucket(90.0), 6);
        assert_eq!(config.bucket(99.9), 6);
    }

    #[test]
    fn test_bucket_out_of_range_not_clamped() {
        let config = DetectorConfig::default();
        assert_eq!(config.bucket(100.0), 7);
        assert_eq!(config.bucket(250.0), 17);
        assert_eq!(config.bucket(-1.0), -1);
        assert_eq!(config.bucket(-30.0), -3);
    }

    #[test]
    fn test_degenerate_range_uses_norm_value() {
        let config = DetectorConfig::with_range(5.0, 5.0);
        assert_eq!(config.bucket_width(), 1.0);
        assert_eq!(config.bucket(5.0), 0);
        assert_eq!(config.bucket(7.5), 2);
        assert_eq!(config.bucket(4.0), -1);
    }

    #[test]
    fn test_validate_rejects_zero_norm_value() {
        let config = DetectorConfig::default().norm_value(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroNormValue));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let config = DetectorConfig::default().memory_window(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroMemoryWindow));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let config = DetectorConfig::with_range(10.0, 1.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_nan_bound() {
        let config = DetectorConfig::with_range(f64::NAN, 1.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFiniteBound(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{"max_value": 1.0, "rest_period": 5}"#).unwrap();
        assert_eq!(config.max_value, 1.0);
        assert_eq!(config.rest_period, 5);
        assert_eq!(config.norm_value, DEFAULT_NORM_VALUE);
    }
}
