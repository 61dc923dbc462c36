//! Period classification of a scoring call.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase a detector was in when it produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Period {
    /// Observation arrived with a timestamp older than the last accepted one
    /// and was discarded.
    OrderViolation = 0,
    /// Detector is still within its training volume.
    #[default]
    Training = 1,
    /// Score was dampened by an active cooldown.
    Rest = 2,
    /// Normal scoring.
    Regular = 3,
}

impl Period {
    /// Whether a score produced in this period may be flagged as an anomaly.
    pub fn is_alert_eligible(&self) -> bool {
        match self {
            Self::OrderViolation | Self::Training => false,
            Self::Rest | Self::Regular => true,
        }
    }

    /// Human readable label used on emitted records.
    pub fn description(&self) -> &'static str {
        match self {
            Self::OrderViolation => "Input Time Out Of Order",
            Self::Training => "Training",
            Self::Rest => "Rest",
            Self::Regular => "Regular",
        }
    }

    /// Short machine label (metric labels, JSON).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderViolation => "order_violation",
            Self::Training => "training",
            Self::Rest => "rest",
            Self::Regular => "regular",
        }
    }

    /// Convert from the persisted tag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::OrderViolation),
            1 => Some(Self::Training),
            2 => Some(Self::Rest),
            3 => Some(Self::Regular),
            _ => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility() {
        assert!(!Period::OrderViolation.is_alert_eligible());
        assert!(!Period::Training.is_alert_eligible());
        assert!(Period::Rest.is_alert_eligible());
        assert!(Period::Regular.is_alert_eligible());
    }

    #[test]
    fn test_tag_roundtrip() {
        for period in [
            Period::OrderViolation,
            Period::Training,
            Period::Rest,
            Period::Regular,
        ] {
            assert_eq!(Period::from_u8(period as u8), Some(period));
        }
        assert_eq!(Period::from_u8(9), None);
    }

    #[test]
    fn test_description() {
        assert_eq!(Period::OrderViolation.to_string(), "Input Time Out Of Order");
        assert_eq!(Period::Rest.description(), "Rest");
    }
}
