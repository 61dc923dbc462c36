// Rarity Pipeline - Keyed scoring over line protocol streams
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Scoring adapter
//!
//! Runs one load, score, persist cycle per observation against a
//! [`StateStore`]. The cycle is not atomic: callers must not score the same
//! key from two places at once (see [`crate::partition`]).

use rarity::{Detector, DetectorConfig, Period, ScoreResult, Timestamp};
use tracing::{debug, trace};

use crate::error::{PipelineError, Result};
use crate::store::StateStore;

/// Outcome of one adapter cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    /// Engine result
    pub result: ScoreResult,
    /// Whether the state was written back
    pub persisted: bool,
    /// Distinct patterns held by the detector after the call
    pub pattern_count: usize,
}

/// Loads, scores and persists detectors by key
#[derive(Debug)]
pub struct ScoringAdapter<S> {
    store: S,
    config: DetectorConfig,
    persist_on_discard: bool,
}

impl<S: StateStore> ScoringAdapter<S> {
    /// Create an adapter. `config` applies to keys without stored state.
    pub fn new(store: S, config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            persist_on_discard: false,
        })
    }

    /// Also write state back after an order violation
    pub fn persist_on_discard(mut self, persist: bool) -> Self {
        self.persist_on_discard = persist;
        self
    }

    /// Configuration for new keys
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the stored detector for a key
    pub fn load(&self, key: &str) -> Result<Option<Detector>> {
        match self.store.get(key)? {
            Some(bytes) => Detector::from_bytes(&bytes)
                .map(Some)
                .map_err(|source| PipelineError::CorruptState {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Load or create the detector for a key
    fn load_or_default(&self, key: &str) -> Result<Detector> {
        match self.load(key)? {
            Some(detector) => Ok(detector),
            None => {
                debug!(key, "Creating detector");
                self.fresh_detector()
            }
        }
    }

    /// Score one observation for a key
    pub fn score(&self, key: &str, value: f64, timestamp: Timestamp) -> Result<Scored> {
        let mut detector = self.load_or_default(key)?;
        let result = detector.score(value, timestamp);

        let persisted = result.period != Period::OrderViolation || self.persist_on_discard;
        if persisted {
            self.store.set(key, &detector.to_bytes())?;
        }

        trace!(
            key,
            value,
            timestamp,
            score = result.score,
            period = result.period.as_str(),
            persisted,
            "Scored"
        );

        Ok(Scored {
            result,
            persisted,
            pattern_count: detector.pattern_count(),
        })
    }

    fn fresh_detector(&self) -> Result<Detector> {
        Detector::with_config(self.config)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    /// Replace the state of a key with a fresh detector
    pub fn reset(&self, key: &str) -> Result<()> {
        let detector = self.fresh_detector()?;
        self.store.set(key, &detector.to_bytes())?;
        Ok(())
    }
}
