//! Health aggregation by resource

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::items::{HealthItem, ItemState, Severity};
use super::metadata::HealthMetadata;
use super::score::compute_resource_score;
use crate::context::PluginContext;

/// Name of the stat holding items bound to no resource
pub const GLOBAL_NAME: &str = "global";

/// Kind of resource an item is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Superkind {
    Global,
    Node,
    Namespace,
    Owner,
}

/// Health item resolved to a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedItem {
    pub item: HealthItem,
    pub superkind: Superkind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_link: Option<String>,
}

fn label_value<'a>(item: &'a HealthItem, keys: &[String]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| item.labels.get(k))
        .map(String::as_str)
        .find(|v| !v.is_empty())
}

impl NamedItem {
    pub fn global(item: HealthItem) -> Self {
        Self {
            item,
            superkind: Superkind::Global,
            name: GLOBAL_NAME.to_string(),
            namespace: None,
            kind: None,
            traffic_link: None,
        }
    }

    /// Resolve the resource of `item` from the label keys of its metadata.
    ///
    /// Returns `None` when the rule declares owner labels but the item lacks
    /// one of them: such items are dropped rather than bound to their
    /// namespace.
    pub fn classify(item: HealthItem) -> Option<Self> {
        let md = &item.metadata;

        let (superkind, name, namespace, kind) = if md.declares_owner() {
            let workload = label_value(&item, &md.workload_labels)?;
            let namespace = label_value(&item, &md.namespace_labels)?;
            let kind = label_value(&item, &md.kind_labels)?;
            (
                Superkind::Owner,
                workload.to_string(),
                Some(namespace.to_string()),
                Some(kind.to_string()),
            )
        } else if let Some(namespace) = label_value(&item, &md.namespace_labels) {
            (Superkind::Namespace, namespace.to_string(), None, None)
        } else if let Some(node) = label_value(&item, &md.node_labels) {
            (Superkind::Node, node.to_string(), None, None)
        } else {
            return Some(Self::global(item));
        };

        Some(Self {
            item,
            superkind,
            name,
            namespace,
            kind,
            traffic_link: None,
        })
    }

    /// Link to the traffic page filtered on this resource
    pub fn build_traffic_link(&self, traffic_page: &str) -> String {
        let md: &HealthMetadata = &self.item.metadata;
        let prefix = md.traffic_link.direction.filter_prefix();

        let mut filters = Vec::new();
        match self.superkind {
            Superkind::Owner => {
                if let Some(ns) = &self.namespace {
                    filters.push(format!("{prefix}namespace={ns}"));
                }
                filters.push(format!("{prefix}owner_name={}", self.name));
            }
            Superkind::Namespace => filters.push(format!("{prefix}namespace={}", self.name)),
            Superkind::Node => filters.push(format!("{prefix}host_name={}", self.name)),
            Superkind::Global => {}
        }
        if let Some(extra) = &md.traffic_link.extra_filter {
            filters.push(extra.clone());
        }

        let encoded: String = url::form_urlencoded::byte_serialize(filters.join(";").as_bytes()).collect();
        format!(
            "{traffic_page}?filters={encoded}&bnf={}",
            md.traffic_link.back_and_forth
        )
    }
}

/// Items of one severity, by state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityStats {
    pub firing: Vec<NamedItem>,
    pub pending: Vec<NamedItem>,
    pub silenced: Vec<NamedItem>,
    pub recording: Vec<NamedItem>,
    /// Names of rules without signal
    pub inactive: Vec<String>,
}

impl SeverityStats {
    fn add(&mut self, item: NamedItem) {
        match item.item.state {
            ItemState::Firing => self.firing.push(item),
            ItemState::Pending => self.pending.push(item),
            ItemState::Silenced => self.silenced.push(item),
            ItemState::Recording => self.recording.push(item),
            ItemState::Inactive => self.inactive.push(item.item.rule_name),
        }
    }

    pub fn active_items(&self) -> impl Iterator<Item = &NamedItem> {
        self.firing
            .iter()
            .chain(&self.pending)
            .chain(&self.silenced)
            .chain(&self.recording)
    }

    pub fn is_inactive(&self) -> bool {
        self.active_items().next().is_none()
    }

    fn sort(&mut self) {
        let by_rule = |a: &NamedItem, b: &NamedItem| {
            a.item
                .rule_name
                .cmp(&b.item.rule_name)
                .then_with(|| a.item.labels.cmp(&b.item.labels))
        };
        self.firing.sort_by(by_rule);
        self.pending.sort_by(by_rule);
        self.silenced.sort_by(by_rule);
        self.recording.sort_by(by_rule);
        self.inactive.sort();
        self.inactive.dedup();
    }
}

/// Aggregated health of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStat {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub critical: SeverityStats,
    pub warning: SeverityStats,
    /// Info and unrecognized severities
    pub other: SeverityStats,
    pub score: f64,
}

impl HealthStat {
    pub fn new(name: impl Into<String>, namespace: Option<String>, kind: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
            kind,
            critical: SeverityStats::default(),
            warning: SeverityStats::default(),
            other: SeverityStats::default(),
            score: super::score::MAX_SCORE,
        }
    }

    pub fn buckets(&self) -> [(Severity, &SeverityStats); 3] {
        [
            (Severity::Critical, &self.critical),
            (Severity::Warning, &self.warning),
            (Severity::Info, &self.other),
        ]
    }

    fn bucket_mut(&mut self, severity: Severity) -> &mut SeverityStats {
        match severity {
            Severity::Critical => &mut self.critical,
            Severity::Warning => &mut self.warning,
            Severity::Info => &mut self.other,
        }
    }

    fn add(&mut self, item: NamedItem) {
        self.bucket_mut(item.item.severity).add(item);
    }

    /// No firing, pending, silenced or recording item in any bucket
    pub fn is_inactive(&self) -> bool {
        self.buckets().iter().all(|(_, b)| b.is_inactive())
    }

    pub fn item_count(&self) -> usize {
        self.buckets()
            .iter()
            .map(|(_, b)| b.active_items().count())
            .sum()
    }

    fn finish(&mut self) {
        self.critical.sort();
        self.warning.sort();
        self.other.sort();
        self.score = compute_resource_score(self);
    }
}

/// Health of every resource with an active signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStats {
    pub global: HealthStat,
    pub by_namespace: Vec<HealthStat>,
    pub by_node: Vec<HealthStat>,
    pub by_owner: Vec<HealthStat>,
}

impl HealthStats {
    pub fn namespace(&self, name: &str) -> Option<&HealthStat> {
        self.by_namespace.iter().find(|s| s.name == name)
    }

    pub fn node(&self, name: &str) -> Option<&HealthStat> {
        self.by_node.iter().find(|s| s.name == name)
    }

    pub fn owner(&self, namespace: &str, name: &str) -> Option<&HealthStat> {
        self.by_owner
            .iter()
            .find(|s| s.name == name && s.namespace.as_deref() == Some(namespace))
    }
}

type ResourceKey = (String, Option<String>, Option<String>);

fn finish_group(groups: BTreeMap<ResourceKey, HealthStat>) -> Vec<HealthStat> {
    let mut stats: Vec<HealthStat> = groups
        .into_values()
        .filter(|s| !s.is_inactive())
        .map(|mut s| {
            s.finish();
            s
        })
        .collect();
    stats.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.namespace.cmp(&b.namespace))
            .then_with(|| a.kind.cmp(&b.kind))
    });
    stats
}

/// Group items by resource and score each resource.
///
/// Resources whose items are all inactive are left out; the others are
/// sorted worst first.
pub fn build_stats(items: &[HealthItem], ctx: &PluginContext) -> HealthStats {
    let mut global = HealthStat::new(GLOBAL_NAME, None, None);
    let mut by_namespace: BTreeMap<ResourceKey, HealthStat> = BTreeMap::new();
    let mut by_node: BTreeMap<ResourceKey, HealthStat> = BTreeMap::new();
    let mut by_owner: BTreeMap<ResourceKey, HealthStat> = BTreeMap::new();
    let mut dropped = 0usize;

    for item in items {
        let Some(mut named) = NamedItem::classify(item.clone()) else {
            dropped += 1;
            continue;
        };
        named.traffic_link = Some(named.build_traffic_link(ctx.traffic_page_path()));

        let groups = match named.superkind {
            Superkind::Global => {
                global.add(named);
                continue;
            }
            Superkind::Namespace => &mut by_namespace,
            Superkind::Node => &mut by_node,
            Superkind::Owner => &mut by_owner,
        };
        let key = (named.name.clone(), named.namespace.clone(), named.kind.clone());
        groups
            .entry(key)
            .or_insert_with(|| HealthStat::new(named.name.clone(), named.namespace.clone(), named.kind.clone()))
            .add(named);
    }

    global.finish();
    let stats = HealthStats {
        global,
        by_namespace: finish_group(by_namespace),
        by_node: finish_group(by_node),
        by_owner: finish_group(by_owner),
    };

    debug!(
        items = items.len(),
        dropped,
        namespaces = stats.by_namespace.len(),
        nodes = stats.by_node.len(),
        owners = stats.by_owner.len(),
        global_score = stats.global.score,
        "Health stats built"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::items::{items_from_rules, Alert, AlertState, Rule};
    use crate::health::metadata::HEALTH_ANNOTATION;
    use std::collections::HashMap;

    fn alert(value: f64, labels: &[(&str, &str)]) -> Alert {
        Alert {
            state: AlertState::Firing,
            value: value.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            annotations: HashMap::new(),
            active_at: None,
        }
    }

    fn rule(name: &str, severity: &str, metadata: &str, alerts: Vec<Alert>) -> Rule {
        Rule {
            name: name.to_string(),
            query: String::new(),
            labels: HashMap::from([("severity".to_string(), severity.to_string())]),
            annotations: HashMap::from([(HEALTH_ANNOTATION.to_string(), metadata.to_string())]),
            alerts,
        }
    }

    const NAMESPACE_MD: &str = r#"{"threshold":"10","namespaceLabels":["namespace"]}"#;
    const OWNER_MD: &str = r#"{"threshold":"10","namespaceLabels":["namespace"],"workloadLabels":["workload"],"kindLabels":["kind"]}"#;

    fn scenario() -> Vec<Rule> {
        vec![
            rule(
                "PacketDrops",
                "warning",
                NAMESPACE_MD,
                vec![
                    alert(20.0, &[("namespace", "a")]),
                    alert(50.0, &[("namespace", "b")]),
                ],
            ),
            rule(
                "DnsErrors",
                "info",
                NAMESPACE_MD,
                vec![
                    alert(45.0, &[("namespace", "a")]),
                    alert(10.0, &[("namespace", "b")]),
                ],
            ),
            rule(
                "WorkloadLatency",
                "warning",
                OWNER_MD,
                vec![alert(
                    55.0,
                    &[("namespace", "a"), ("workload", "w"), ("kind", "Deployment")],
                )],
            ),
        ]
    }

    #[test]
    fn test_namespace_and_owner_grouping() {
        let ctx = PluginContext::default();
        let items = items_from_rules(&scenario(), &[], &ctx);
        let stats = build_stats(&items, &ctx);

        assert_eq!(stats.by_namespace.len(), 2);
        assert_eq!(stats.by_namespace[0].name, "b");
        assert!((stats.by_namespace[0].score - 7.48).abs() < 0.05);
        assert_eq!(stats.by_namespace[1].name, "a");
        assert!(stats.by_namespace[1].score > 7.8 && stats.by_namespace[1].score < 7.9);

        assert_eq!(stats.by_owner.len(), 1);
        let owner = &stats.by_owner[0];
        assert_eq!(owner.name, "w");
        assert_eq!(owner.namespace.as_deref(), Some("a"));
        assert_eq!(owner.kind.as_deref(), Some("Deployment"));

        // the owner alert is not counted again in its namespace
        let a = stats.namespace("a").unwrap();
        assert_eq!(a.warning.firing.len(), 1);
        assert_eq!(a.other.firing.len(), 1);
        assert_eq!(a.item_count(), 2);
        assert!(stats.by_node.is_empty());
    }

    #[test]
    fn test_owner_item_missing_label_is_dropped() {
        let ctx = PluginContext::default();
        let rules = vec![rule(
            "WorkloadLatency",
            "warning",
            OWNER_MD,
            vec![alert(55.0, &[("namespace", "a"), ("workload", "w")])],
        )];
        let stats = build_stats(&items_from_rules(&rules, &[], &ctx), &ctx);
        assert!(stats.by_owner.is_empty());
        assert!(stats.by_namespace.is_empty());
        assert!(stats.global.is_inactive());
    }

    #[test]
    fn test_inactive_rules_go_global_and_keep_perfect_score() {
        let ctx = PluginContext::default();
        let rules = vec![
            rule("Quiet", "critical", NAMESPACE_MD, vec![]),
            rule("Quiet", "critical", NAMESPACE_MD, vec![]),
            rule("AlsoQuiet", "info", "{}", vec![]),
        ];
        let stats = build_stats(&items_from_rules(&rules, &[], &ctx), &ctx);
        assert_eq!(stats.global.critical.inactive, vec!["Quiet".to_string()]);
        assert_eq!(stats.global.other.inactive, vec!["AlsoQuiet".to_string()]);
        assert_eq!(stats.global.score, 10.0);
        assert!(stats.by_namespace.is_empty());
    }

    #[test]
    fn test_node_classification_and_link() {
        let ctx = PluginContext::default();
        let rules = vec![rule(
            "NodeDrops",
            "critical",
            r#"{"threshold":"5","nodeLabels":["node"],"trafficLink":{"extraFilter":"proto=6","filterDestination":true}}"#,
            vec![alert(30.0, &[("node", "worker-1")])],
        )];
        let stats = build_stats(&items_from_rules(&rules, &[], &ctx), &ctx);
        let node = stats.node("worker-1").unwrap();
        let link = node.critical.firing[0].traffic_link.as_deref().unwrap();
        assert_eq!(
            link,
            "/netflow-traffic?filters=dst_host_name%3Dworker-1%3Bproto%3D6&bnf=true"
        );
    }

    #[test]
    fn test_build_stats_is_deterministic() {
        let ctx = PluginContext::default();
        let mut items = items_from_rules(&scenario(), &[], &ctx);
        let first = build_stats(&items, &ctx);
        items.reverse();
        let second = build_stats(&items, &ctx);
        assert_eq!(first, second);
    }
}
