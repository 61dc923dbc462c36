// Rarity Pipeline - Keyed scoring over line protocol streams
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Configuration types for Rarity Pipeline

use std::path::Path;

use rarity::DetectorConfig;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::ingest::IngestRules;

/// Default number of records between progress lines
pub const DEFAULT_LOG_EVERY: u64 = 1000;

/// Pipeline-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Configuration of detectors created for new keys
    pub detector: DetectorConfig,

    /// Which records are scored and how they are keyed
    pub ingest: IngestRules,

    /// Write state back after an order violation (default: false)
    pub persist_on_discard: bool,

    /// Records between progress lines, 0 disables them
    pub log_every: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            ingest: IngestRules::default(),
            persist_on_discard: false,
            log_every: DEFAULT_LOG_EVERY,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with a custom detector configuration
    pub fn with_detector(detector: DetectorConfig) -> Self {
        Self {
            detector,
            ..Default::default()
        }
    }

    /// Create a configuration with custom ingestion rules
    pub fn with_rules(ingest: IngestRules) -> Self {
        Self {
            ingest,
            ..Default::default()
        }
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Check every part of the configuration
    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        self.ingest.validate()
    }
}
