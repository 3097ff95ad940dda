//! Health score computation

use serde::{Deserialize, Serialize};

use super::items::{HealthItem, ItemState, Severity};
use super::stats::HealthStat;

/// Score of a resource without any active signal
pub const MAX_SCORE: f64 = 10.0;

/// Score contribution of one item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemScore {
    pub raw_score: f64,
    pub weight: f64,
}

/// Score range per severity; ranges overlap
pub fn severity_range(severity: Severity) -> (f64, f64) {
    match severity {
        Severity::Critical => (0.0, 6.0),
        Severity::Warning => (4.0, 8.0),
        Severity::Info => (6.0, 10.0),
    }
}

pub fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 1.0,
        Severity::Warning => 0.5,
        Severity::Info => 0.25,
    }
}

pub fn state_weight(state: ItemState) -> f64 {
    match state {
        ItemState::Firing | ItemState::Recording => 1.0,
        ItemState::Pending => 0.3,
        ItemState::Silenced => 0.1,
        ItemState::Inactive => 0.0,
    }
}

/// Position of `value` between `threshold` and `upper_bound`, in `[0, 1]`.
/// An empty or inverted range reads as 0.
pub fn compute_excess_ratio(value: f64, threshold: f64, upper_bound: f64) -> f64 {
    let range = upper_bound - threshold;
    if !(range > 0.0) {
        return 0.0;
    }
    (value.clamp(threshold, upper_bound) - threshold) / range
}

pub fn compute_health_item_score(item: &HealthItem) -> ItemScore {
    let (min, max) = severity_range(item.severity);
    let ratio = compute_excess_ratio(item.value, item.threshold, item.upper_bound);
    ItemScore {
        raw_score: min + (max - min) * (1.0 - ratio),
        weight: severity_weight(item.severity) * state_weight(item.state),
    }
}

/// Weighted average of the item scores of a resource. Inactive rules count
/// as perfect scores with their severity weight.
pub fn compute_resource_score(stat: &HealthStat) -> f64 {
    let mut scores = Vec::new();
    for (severity, bucket) in stat.buckets() {
        scores.extend(bucket.active_items().map(|i| compute_health_item_score(&i.item)));
        scores.extend(bucket.inactive.iter().map(|_| ItemScore {
            raw_score: MAX_SCORE,
            weight: severity_weight(severity),
        }));
    }

    let (sum, total_weight) = scores
        .iter()
        .filter(|s| s.raw_score.is_finite() && s.weight.is_finite())
        .fold((0.0, 0.0), |(sum, total), s| {
            (sum + s.raw_score * s.weight, total + s.weight)
        });

    if total_weight <= 0.0 {
        return MAX_SCORE;
    }
    (sum / total_weight).clamp(0.0, MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::metadata::HealthMetadata;
    use crate::health::stats::NamedItem;
    use std::collections::BTreeMap;

    fn item(severity: Severity, state: ItemState, threshold: f64, value: f64) -> HealthItem {
        HealthItem {
            rule_name: "rule".to_string(),
            severity,
            state,
            value,
            threshold,
            upper_bound: 100.0,
            labels: BTreeMap::new(),
            summary: None,
            description: None,
            links: Vec::new(),
            active_at: None,
            metadata: HealthMetadata::default(),
        }
    }

    #[test]
    fn test_critical_at_threshold() {
        let score = compute_health_item_score(&item(Severity::Critical, ItemState::Firing, 10.0, 10.0));
        assert!((score.raw_score - 6.0).abs() < 1e-9);
        assert_eq!(score.weight, 1.0);
    }

    #[test]
    fn test_critical_at_upper_bound() {
        let score = compute_health_item_score(&item(Severity::Critical, ItemState::Firing, 10.0, 100.0));
        assert_eq!(score.raw_score, 0.0);
    }

    #[test]
    fn test_info_pending() {
        let score = compute_health_item_score(&item(Severity::Info, ItemState::Pending, 10.0, 10.0));
        assert!((score.raw_score - 10.0).abs() < 1e-9);
        assert!((score.weight - 0.075).abs() < 1e-9);
    }

    #[test]
    fn test_excess_ratio_guards() {
        assert_eq!(compute_excess_ratio(50.0, 100.0, 100.0), 0.0);
        assert_eq!(compute_excess_ratio(50.0, 100.0, 10.0), 0.0);
        assert_eq!(compute_excess_ratio(50.0, f64::NAN, 10.0), 0.0);
        assert_eq!(compute_excess_ratio(0.0, 10.0, 20.0), 0.0);
        assert_eq!(compute_excess_ratio(15.0, 10.0, 20.0), 0.5);
        assert_eq!(compute_excess_ratio(500.0, 10.0, 20.0), 1.0);
    }

    #[test]
    fn test_raw_score_within_severity_range() {
        for severity in [Severity::Critical, Severity::Warning, Severity::Info] {
            let (min, max) = severity_range(severity);
            for value in [-10.0, 0.0, 10.0, 55.0, 100.0, 1e9] {
                let s = compute_health_item_score(&item(severity, ItemState::Firing, 10.0, value));
                assert!(s.raw_score >= min && s.raw_score <= max, "{severity:?} {value}");
            }
        }
    }

    fn named(item: HealthItem) -> NamedItem {
        NamedItem::global(item)
    }

    #[test]
    fn test_empty_stat_is_perfect() {
        assert_eq!(compute_resource_score(&HealthStat::new("global", None, None)), MAX_SCORE);
    }

    #[test]
    fn test_inactive_only_is_perfect() {
        let mut stat = HealthStat::new("global", None, None);
        stat.critical.inactive.push("A".to_string());
        stat.other.inactive.push("B".to_string());
        assert_eq!(compute_resource_score(&stat), MAX_SCORE);
    }

    #[test]
    fn test_weighted_average() {
        let mut stat = HealthStat::new("global", None, None);
        stat.critical
            .firing
            .push(named(item(Severity::Critical, ItemState::Firing, 10.0, 100.0)));
        stat.critical.inactive.push("Quiet".to_string());
        // (0 * 1 + 10 * 1) / 2
        assert!((compute_resource_score(&stat) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_scores_ignored() {
        let mut stat = HealthStat::new("global", None, None);
        stat.warning
            .firing
            .push(named(item(Severity::Warning, ItemState::Firing, 10.0, f64::NAN)));
        assert_eq!(compute_resource_score(&stat), MAX_SCORE);
    }
}
