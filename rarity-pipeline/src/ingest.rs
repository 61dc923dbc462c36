// Rarity Pipeline - Keyed scoring over line protocol streams
// Copyright (c) 2025 Rarity Contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Ingestion rules
//!
//! Rules decide which records are scored and how each selected field becomes
//! a keyed observation. A record matching no rule is skipped, never an error.

use chrono::{DateTime, TimeZone, Utc};
use rarity::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::line::{LineRecord, NANOS_PER_SECOND};

/// Default key prefix
pub const DEFAULT_PREFIX: &str = "dbaas";

/// Default tag carrying the host name
pub const DEFAULT_HOST_TAG: &str = "host";

/// One observation for one detector
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Detector key, `{prefix}.{measurement}.{field}.{host}`
    pub key: String,
    /// Host the record came from
    pub host: String,
    /// Observed value
    pub value: f64,
    /// Source timestamp in nanoseconds
    pub timestamp_ns: i64,
    /// Collection time at second resolution
    pub collected_at: DateTime<Utc>,
    /// When the pipeline read the record
    pub received_at: DateTime<Utc>,
}

impl Observation {
    /// Build an observation, deriving the collection time from the timestamp.
    ///
    /// Returns `None` when the timestamp is outside the representable range.
    pub fn new(
        key: impl Into<String>,
        host: impl Into<String>,
        value: f64,
        timestamp_ns: i64,
        received_at: DateTime<Utc>,
    ) -> Option<Self> {
        let secs = timestamp_ns.div_euclid(NANOS_PER_SECOND);
        let collected_at = Utc.timestamp_opt(secs, 0).single()?;
        Some(Self {
            key: key.into(),
            host: host.into(),
            value,
            timestamp_ns,
            collected_at,
            received_at,
        })
    }

    /// Detector timestamp in whole seconds
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp_ns.div_euclid(NANOS_PER_SECOND)
    }
}

/// A required tag value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    pub key: String,
    pub value: String,
}

/// Selects one measurement and expands its fields into observations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRule {
    /// Measurement name to match
    pub measurement: String,

    /// Tag that must be present with this value
    #[serde(default)]
    pub filter: Option<TagFilter>,

    /// Fields to score, in emission order
    pub fields: Vec<String>,
}

impl IngestRule {
    /// Rule for a measurement with no tag filter
    pub fn new(measurement: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            measurement: measurement.into(),
            filter: None,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Require a tag value
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = Some(TagFilter {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Whether this rule applies to a record
    pub fn matches(&self, record: &LineRecord) -> bool {
        if record.measurement != self.measurement {
            return false;
        }
        match &self.filter {
            Some(filter) => record.tag(&filter.key) == Some(filter.value.as_str()),
            None => true,
        }
    }
}

/// The full rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestRules {
    /// First key segment
    pub prefix: String,
    /// Tag holding the host name
    pub host_tag: String,
    /// Rules, first match wins
    pub rules: Vec<IngestRule>,
}

impl Default for IngestRules {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            host_tag: DEFAULT_HOST_TAG.to_string(),
            rules: vec![
                IngestRule::new(
                    "cpu",
                    &["usage_user", "usage_system", "usage_idle", "usage_iowait"],
                )
                .with_filter("cpu", "cpu-total"),
                IngestRule::new("disk", &["used_percent"]).with_filter("path", "/data"),
            ],
        }
    }
}

impl IngestRules {
    /// Rules with a custom prefix and no rule entries
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            rules: Vec::new(),
            ..Default::default()
        }
    }

    /// Append a rule
    pub fn rule(mut self, rule: IngestRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Check the rule set is usable
    pub fn validate(&self) -> Result<()> {
        if self.host_tag.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "host_tag must not be empty".to_string(),
            ));
        }
        for rule in &self.rules {
            if rule.measurement.is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "rule measurement must not be empty".to_string(),
                ));
            }
            if rule.fields.is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "rule '{}' selects no fields",
                    rule.measurement
                )));
            }
        }
        Ok(())
    }

    /// Detector key for a field of a host
    pub fn key(&self, measurement: &str, field: &str, host: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}.{}.{}", measurement, field, host)
        } else {
            format!("{}.{}.{}.{}", self.prefix, measurement, field, host)
        }
    }

    /// Expand a record into observations. Unmatched records yield none.
    pub fn observations(&self, record: &LineRecord, received_at: DateTime<Utc>) -> Vec<Observation> {
        let Some(rule) = self.rules.iter().find(|r| r.matches(record)) else {
            return Vec::new();
        };

        let Some(host) = record.tag(&self.host_tag) else {
            debug!(
                measurement = %record.measurement,
                host_tag = %self.host_tag,
                "Skipping record without host tag"
            );
            return Vec::new();
        };

        let mut observations = Vec::with_capacity(rule.fields.len());
        for field in &rule.fields {
            let Some(value) = record.field(field).and_then(|v| v.as_f64()) else {
                debug!(measurement = %record.measurement, field = %field, "Missing or non-numeric field");
                continue;
            };
            if !value.is_finite() {
                debug!(measurement = %record.measurement, field = %field, value, "Non-finite value");
                continue;
            }

            let key = self.key(&record.measurement, field, host);
            match Observation::new(key, host, value, record.timestamp_ns, received_at) {
                Some(observation) => observations.push(observation),
                None => debug!(timestamp_ns = record.timestamp_ns, "Timestamp out of range"),
            }
        }
        observations
    }
}
