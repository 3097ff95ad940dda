//! Health metadata carried by rule annotations

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Annotation holding the JSON metadata of a health rule
pub const HEALTH_ANNOTATION: &str = "netobserv_io_network_health";

const DEFAULT_UNIT: &str = "%";
const DEFAULT_UPPER_BOUND: &str = "100";

/// Threshold as written in the rule together with its parsed value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub raw: String,
    pub value: f64,
}

impl Threshold {
    /// Unparseable values read as 0
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            value: raw.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0),
        }
    }
}

/// Side of the flows the traffic link filters on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficDirection {
    #[default]
    Source,
    Destination,
}

impl TrafficDirection {
    pub fn filter_prefix(&self) -> &'static str {
        match self {
            TrafficDirection::Source => "src_",
            TrafficDirection::Destination => "dst_",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficLink {
    pub direction: TrafficDirection,
    pub back_and_forth: bool,
    /// Appended to the generated filters, e.g. `dns_flag_response_code=NXDomain`
    pub extra_filter: Option<String>,
}

impl Default for TrafficLink {
    fn default() -> Self {
        Self {
            direction: TrafficDirection::Source,
            back_and_forth: true,
            extra_filter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleLink {
    pub name: String,
    pub url: String,
}

/// Per-tier thresholds of a recording rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub info: Option<Threshold>,
    pub warning: Option<Threshold>,
    pub critical: Option<Threshold>,
}

impl TierThresholds {
    pub fn is_empty(&self) -> bool {
        self.info.is_none() && self.warning.is_none() && self.critical.is_none()
    }
}

/// Parsed health metadata of one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetadata {
    /// Alert threshold
    pub threshold: Threshold,
    pub thresholds: TierThresholds,
    pub upper_bound: Threshold,
    pub unit: String,
    pub links: Vec<RuleLink>,
    pub namespace_labels: Vec<String>,
    pub node_labels: Vec<String>,
    pub workload_labels: Vec<String>,
    pub kind_labels: Vec<String>,
    pub traffic_link: TrafficLink,
}

impl Default for HealthMetadata {
    fn default() -> Self {
        Self {
            threshold: Threshold::parse(""),
            thresholds: TierThresholds::default(),
            upper_bound: Threshold::parse(DEFAULT_UPPER_BOUND),
            unit: DEFAULT_UNIT.to_string(),
            links: Vec::new(),
            namespace_labels: Vec::new(),
            node_labels: Vec::new(),
            workload_labels: Vec::new(),
            kind_labels: Vec::new(),
            traffic_link: TrafficLink::default(),
        }
    }
}

/// Annotation payload as written by rule authors
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMetadata {
    threshold: Option<String>,
    upper_bound: Option<String>,
    unit: Option<String>,
    links: Vec<RuleLink>,
    namespace_labels: Vec<String>,
    node_labels: Vec<String>,
    workload_labels: Vec<String>,
    kind_labels: Vec<String>,
    recording_thresholds: Option<RawTiers>,
    traffic_link: Option<RawTrafficLink>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTiers {
    info: Option<String>,
    warning: Option<String>,
    critical: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTrafficLink {
    extra_filter: Option<String>,
    back_and_forth: bool,
    filter_destination: bool,
}

impl Default for RawTrafficLink {
    fn default() -> Self {
        Self {
            extra_filter: None,
            back_and_forth: true,
            filter_destination: false,
        }
    }
}

impl From<RawMetadata> for HealthMetadata {
    fn from(raw: RawMetadata) -> Self {
        let defaults = HealthMetadata::default();
        let tier = |value: Option<String>| value.filter(|v| !v.is_empty()).map(|v| Threshold::parse(&v));
        let thresholds = raw
            .recording_thresholds
            .map(|t| TierThresholds {
                info: tier(t.info),
                warning: tier(t.warning),
                critical: tier(t.critical),
            })
            .unwrap_or_default();
        let traffic_link = raw
            .traffic_link
            .map(|l| TrafficLink {
                direction: if l.filter_destination {
                    TrafficDirection::Destination
                } else {
                    TrafficDirection::Source
                },
                back_and_forth: l.back_and_forth,
                extra_filter: l.extra_filter.filter(|f| !f.is_empty()),
            })
            .unwrap_or_default();

        Self {
            threshold: raw
                .threshold
                .map(|t| Threshold::parse(&t))
                .unwrap_or(defaults.threshold),
            thresholds,
            upper_bound: raw
                .upper_bound
                .filter(|u| !u.is_empty())
                .map(|u| Threshold::parse(&u))
                .unwrap_or(defaults.upper_bound),
            unit: raw.unit.filter(|u| !u.is_empty()).unwrap_or(defaults.unit),
            links: raw.links,
            namespace_labels: raw.namespace_labels,
            node_labels: raw.node_labels,
            workload_labels: raw.workload_labels,
            kind_labels: raw.kind_labels,
            traffic_link,
        }
    }
}

impl HealthMetadata {
    /// Read the metadata under `key`. Absent or malformed metadata yields
    /// the defaults.
    pub fn from_annotations(annotations: &HashMap<String, String>, key: &str) -> Self {
        let Some(json) = annotations.get(key) else {
            return Self::default();
        };
        match serde_json::from_str::<RawMetadata>(json) {
            Ok(raw) => raw.into(),
            Err(e) => {
                warn!(
                    event = "health_metadata_invalid",
                    annotation = key,
                    error = %e,
                    "Ignoring malformed health metadata"
                );
                Self::default()
            }
        }
    }

    /// Whether owner classification applies to items of this rule
    pub fn declares_owner(&self) -> bool {
        !self.workload_labels.is_empty()
            && !self.namespace_labels.is_empty()
            && !self.kind_labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(json: &str) -> HashMap<String, String> {
        HashMap::from([(HEALTH_ANNOTATION.to_string(), json.to_string())])
    }

    #[test]
    fn test_defaults_when_absent() {
        let md = HealthMetadata::from_annotations(&HashMap::new(), HEALTH_ANNOTATION);
        assert_eq!(md.unit, "%");
        assert_eq!(md.upper_bound.raw, "100");
        assert_eq!(md.upper_bound.value, 100.0);
        assert_eq!(md.threshold.value, 0.0);
        assert!(md.thresholds.is_empty());
        assert_eq!(md.traffic_link.direction, TrafficDirection::Source);
        assert!(md.traffic_link.back_and_forth);
    }

    #[test]
    fn test_malformed_json_defaults() {
        let md = HealthMetadata::from_annotations(&annotations("{not json"), HEALTH_ANNOTATION);
        assert_eq!(md, HealthMetadata::default());
    }

    #[test]
    fn test_full_metadata() {
        let md = HealthMetadata::from_annotations(
            &annotations(
                r#"{
                    "threshold": "10",
                    "upperBound": "50",
                    "unit": "ms",
                    "namespaceLabels": ["SrcK8S_Namespace"],
                    "workloadLabels": ["SrcK8S_OwnerName"],
                    "kindLabels": ["SrcK8S_OwnerType"],
                    "links": [{"name": "Runbook", "url": "https://runbooks/{{ $labels.namespace }}"}],
                    "recordingThresholds": {"warning": "20", "critical": "abc"},
                    "trafficLink": {"extraFilter": "proto=6", "backAndForth": false, "filterDestination": true}
                }"#,
            ),
            HEALTH_ANNOTATION,
        );
        assert_eq!(md.threshold.value, 10.0);
        assert_eq!(md.upper_bound.value, 50.0);
        assert_eq!(md.unit, "ms");
        assert!(md.declares_owner());
        assert_eq!(md.links.len(), 1);
        assert_eq!(md.thresholds.warning.as_ref().map(|t| t.value), Some(20.0));
        let critical = md.thresholds.critical.unwrap();
        assert_eq!(critical.raw, "abc");
        assert_eq!(critical.value, 0.0);
        assert!(md.thresholds.info.is_none());
        assert_eq!(md.traffic_link.direction, TrafficDirection::Destination);
        assert!(!md.traffic_link.back_and_forth);
        assert_eq!(md.traffic_link.extra_filter.as_deref(), Some("proto=6"));
    }

    #[test]
    fn test_threshold_parse() {
        assert_eq!(Threshold::parse(" 2.5 ").value, 2.5);
        assert_eq!(Threshold::parse("NaN").value, 0.0);
        assert_eq!(Threshold::parse("").value, 0.0);
    }
}
