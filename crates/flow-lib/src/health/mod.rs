//! Network health scoring
//!
//! Alerting and recording rule results are normalized into
//! [`HealthItem`]s, classified by the resource their labels point at, and
//! aggregated into per-resource scores between 0 (worst) and 10.

pub mod items;
pub mod metadata;
pub mod score;
pub mod stats;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use items::{
    items_from_recording, items_from_rules, Alert, AlertState, HealthItem, ItemState,
    RecordingRule, RecordingSample, Rule, Severity, Silence, SilenceMatcher,
};
pub use metadata::{HealthMetadata, Threshold, TrafficDirection, HEALTH_ANNOTATION};
pub use score::{compute_health_item_score, compute_resource_score, ItemScore, MAX_SCORE};
pub use stats::{build_stats, HealthStat, HealthStats, NamedItem, SeverityStats, Superkind};

/// Coarse reading of a resource score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    /// Score below 5
    Critical,
    /// Score below 7
    Warning,
    /// Score below 9
    Minor,
    Healthy,
}

impl HealthLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 5.0 {
            HealthLevel::Critical
        } else if score < 7.0 {
            HealthLevel::Warning
        } else if score < 9.0 {
            HealthLevel::Minor
        } else {
            HealthLevel::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Critical => "critical",
            HealthLevel::Warning => "warning",
            HealthLevel::Minor => "minor",
            HealthLevel::Healthy => "healthy",
        }
    }

    /// Returns true if the resource needs attention
    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthLevel::Critical | HealthLevel::Warning)
    }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_score() {
        assert_eq!(HealthLevel::from_score(0.0), HealthLevel::Critical);
        assert_eq!(HealthLevel::from_score(4.99), HealthLevel::Critical);
        assert_eq!(HealthLevel::from_score(5.0), HealthLevel::Warning);
        assert_eq!(HealthLevel::from_score(7.5), HealthLevel::Minor);
        assert_eq!(HealthLevel::from_score(10.0), HealthLevel::Healthy);
    }

    #[test]
    fn test_degraded_levels() {
        assert!(HealthLevel::Critical.is_degraded());
        assert!(!HealthLevel::Minor.is_degraded());
    }
}
