//! Normalization of alerting and recording rule results into health items

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::metadata::{HealthMetadata, RuleLink, Threshold};
use crate::context::PluginContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Anything but `critical` or `warning` reads as info
    pub fn from_label(value: &str) -> Self {
        match value {
            "critical" => Severity::Critical,
            "warning" => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Firing,
    Pending,
    Silenced,
    Recording,
    Inactive,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Firing => "firing",
            ItemState::Pending => "pending",
            ItemState::Silenced => "silenced",
            ItemState::Recording => "recording",
            ItemState::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Firing,
    Pending,
}

/// Active instance of an alerting rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub state: AlertState,
    /// Sample value as reported by Prometheus
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_at: Option<DateTime<Utc>>,
}

/// Alerting rule with its current alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// One label combination of a recording rule result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSample {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingRule {
    pub name: String,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub samples: Vec<RecordingSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilenceMatcher {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default = "default_true")]
    pub is_equal: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SilenceStatus {
    pub state: String,
}

/// Alertmanager silence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Silence {
    #[serde(default)]
    pub id: String,
    pub matchers: Vec<SilenceMatcher>,
    #[serde(default)]
    pub status: SilenceStatus,
}

/// Value test of a matcher, compiled once per silence
enum Pattern {
    Exact,
    Regex(Regex),
    /// Regex that failed to compile; never matches
    Invalid,
}

impl SilenceMatcher {
    fn compile(&self) -> Pattern {
        if !self.is_regex {
            return Pattern::Exact;
        }
        match Regex::new(&format!("^(?:{})$", self.value)) {
            Ok(re) => Pattern::Regex(re),
            Err(e) => {
                warn!(
                    event = "silence_matcher_invalid",
                    matcher = %self.name,
                    error = %e,
                    "Ignoring silence matcher with invalid regex"
                );
                Pattern::Invalid
            }
        }
    }

    fn matches(&self, pattern: &Pattern, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(&self.name).map(String::as_str).unwrap_or("");
        let equal = match pattern {
            Pattern::Exact => actual == self.value,
            Pattern::Regex(re) => re.is_match(actual),
            Pattern::Invalid => return false,
        };
        equal == self.is_equal
    }
}

/// Active silence with its matchers ready to test alert labels
struct CompiledSilence<'s> {
    matchers: Vec<(&'s SilenceMatcher, Pattern)>,
}

impl CompiledSilence<'_> {
    fn silences(&self, labels: &BTreeMap<String, String>) -> bool {
        self.matchers.iter().all(|(m, pattern)| m.matches(pattern, labels))
    }
}

impl Silence {
    pub fn is_active(&self) -> bool {
        self.status.state == "active"
    }

    /// `None` for silences that cannot match anything
    fn compile(&self) -> Option<CompiledSilence<'_>> {
        if !self.is_active() || self.matchers.is_empty() {
            return None;
        }
        Some(CompiledSilence {
            matchers: self.matchers.iter().map(|m| (m, m.compile())).collect(),
        })
    }

    /// Active silences with at least one matcher, all matching
    pub fn silences(&self, labels: &BTreeMap<String, String>) -> bool {
        self.compile().is_some_and(|c| c.silences(labels))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthLink {
    pub name: String,
    pub url: String,
}

/// One evaluated alert or recording rule sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthItem {
    pub rule_name: String,
    pub severity: Severity,
    pub state: ItemState,
    pub value: f64,
    pub threshold: f64,
    pub upper_bound: f64,
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub links: Vec<HealthLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_at: Option<DateTime<Utc>>,
    pub metadata: HealthMetadata,
}

fn template_regex() -> &'static Regex {
    static TEMPLATE: OnceLock<Regex> = OnceLock::new();
    TEMPLATE.get_or_init(|| {
        Regex::new(r"\{\{\s*\$(value|labels\.([A-Za-z_][A-Za-z0-9_]*))\s*\}\}")
            .expect("template pattern is valid")
    })
}

/// Substitute `{{ $value }}` and `{{ $labels.<key> }}`. Unknown labels are
/// left as written.
pub fn substitute_template(text: &str, value: f64, labels: &BTreeMap<String, String>) -> String {
    template_regex()
        .replace_all(text, |caps: &Captures| match caps.get(2) {
            Some(key) => labels
                .get(key.as_str())
                .cloned()
                .unwrap_or_else(|| caps[0].to_string()),
            None => value.to_string(),
        })
        .into_owned()
}

fn substituted_links(links: &[RuleLink], value: f64, labels: &BTreeMap<String, String>) -> Vec<HealthLink> {
    links
        .iter()
        .map(|l| HealthLink {
            name: l.name.clone(),
            url: substitute_template(&l.url, value, labels),
        })
        .collect()
}

fn annotation<'a>(
    primary: &'a HashMap<String, String>,
    fallback: &'a HashMap<String, String>,
    key: &str,
) -> Option<&'a String> {
    primary.get(key).or_else(|| fallback.get(key))
}

/// One item per alert, or a single inactive item for a rule without alerts
pub fn items_from_rules(rules: &[Rule], silences: &[Silence], ctx: &PluginContext) -> Vec<HealthItem> {
    let silences: Vec<CompiledSilence<'_>> = silences.iter().filter_map(Silence::compile).collect();
    let mut items = Vec::new();
    for rule in rules {
        let metadata = HealthMetadata::from_annotations(&rule.annotations, ctx.health_annotation());
        let rule_severity = rule.labels.get("severity").map(String::as_str);

        if rule.alerts.is_empty() {
            let labels = BTreeMap::new();
            items.push(HealthItem {
                rule_name: rule.name.clone(),
                severity: Severity::from_label(rule_severity.unwrap_or_default()),
                state: ItemState::Inactive,
                value: 0.0,
                threshold: metadata.threshold.value,
                upper_bound: metadata.upper_bound.value,
                summary: rule.annotations.get("summary").cloned(),
                description: rule.annotations.get("description").cloned(),
                links: substituted_links(&metadata.links, 0.0, &labels),
                labels,
                active_at: None,
                metadata,
            });
            continue;
        }

        for alert in &rule.alerts {
            let value = alert.value.trim().parse::<f64>().unwrap_or(0.0);
            let severity = alert
                .labels
                .get("severity")
                .map(String::as_str)
                .or(rule_severity)
                .map(Severity::from_label)
                .unwrap_or(Severity::Info);
            let state = if silences.iter().any(|s| s.silences(&alert.labels)) {
                ItemState::Silenced
            } else {
                match alert.state {
                    AlertState::Firing => ItemState::Firing,
                    AlertState::Pending => ItemState::Pending,
                }
            };
            let render = |key: &str| {
                annotation(&alert.annotations, &rule.annotations, key)
                    .map(|t| substitute_template(t, value, &alert.labels))
            };

            items.push(HealthItem {
                rule_name: rule.name.clone(),
                severity,
                state,
                value,
                threshold: metadata.threshold.value,
                upper_bound: metadata.upper_bound.value,
                labels: alert.labels.clone(),
                summary: render("summary"),
                description: render("description"),
                links: substituted_links(&metadata.links, value, &alert.labels),
                active_at: alert.active_at,
                metadata: metadata.clone(),
            });
        }
    }
    debug!(rules = rules.len(), items = items.len(), "Normalized alerting rules");
    items
}

/// Tier met by `value`, highest first; below every tier falls back to the
/// lowest configured one
fn recording_tier(metadata: &HealthMetadata, value: f64) -> Option<(Severity, &Threshold)> {
    let tiers = &metadata.thresholds;
    let configured = [
        (Severity::Critical, tiers.critical.as_ref()),
        (Severity::Warning, tiers.warning.as_ref()),
        (Severity::Info, tiers.info.as_ref()),
    ];
    let configured: Vec<(Severity, &Threshold)> = configured
        .into_iter()
        .filter_map(|(severity, t)| t.map(|t| (severity, t)))
        .collect();

    configured
        .iter()
        .find(|(_, t)| value >= t.value)
        .or(configured.last())
        .copied()
}

/// One item per recorded label combination
pub fn items_from_recording(rules: &[RecordingRule], ctx: &PluginContext) -> Vec<HealthItem> {
    let mut items = Vec::new();
    for rule in rules {
        let metadata = HealthMetadata::from_annotations(&rule.annotations, ctx.health_annotation());
        for sample in &rule.samples {
            let (severity, state, threshold) = match recording_tier(&metadata, sample.value) {
                Some((severity, t)) => (severity, ItemState::Recording, t.value),
                None => (Severity::Info, ItemState::Inactive, 0.0),
            };
            let render = |key: &str| {
                rule.annotations
                    .get(key)
                    .map(|t| substitute_template(t, sample.value, &sample.labels))
            };
            items.push(HealthItem {
                rule_name: rule.name.clone(),
                severity,
                state,
                value: sample.value,
                threshold,
                upper_bound: metadata.upper_bound.value,
                labels: sample.labels.clone(),
                summary: render("summary"),
                description: render("description"),
                links: substituted_links(&metadata.links, sample.value, &sample.labels),
                active_at: None,
                metadata: metadata.clone(),
            });
        }
    }
    debug!(rules = rules.len(), items = items.len(), "Normalized recording rules");
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::metadata::HEALTH_ANNOTATION;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn alert(state: AlertState, value: &str, pairs: &[(&str, &str)]) -> Alert {
        Alert {
            state,
            value: value.to_string(),
            labels: labels(pairs),
            annotations: HashMap::new(),
            active_at: None,
        }
    }

    fn rule(name: &str, severity: &str, metadata: &str, alerts: Vec<Alert>) -> Rule {
        Rule {
            name: name.to_string(),
            query: String::new(),
            labels: HashMap::from([("severity".to_string(), severity.to_string())]),
            annotations: HashMap::from([
                (HEALTH_ANNOTATION.to_string(), metadata.to_string()),
                (
                    "summary".to_string(),
                    "{{ $value }}% drops in {{$labels.namespace}} {{ $labels.missing }}".to_string(),
                ),
            ]),
            alerts,
        }
    }

    #[test]
    fn test_substitute_template() {
        let l = labels(&[("namespace", "ns1")]);
        assert_eq!(
            substitute_template("{{ $value }} in {{ $labels.namespace }}", 12.5, &l),
            "12.5 in ns1"
        );
        assert_eq!(
            substitute_template("{{ $labels.pod }} {{ $other }}", 1.0, &l),
            "{{ $labels.pod }} {{ $other }}"
        );
        assert_eq!(substitute_template("{{$value}}", 10.0, &l), "10");
    }

    #[test]
    fn test_rule_without_alerts_is_inactive() {
        let ctx = PluginContext::default();
        let items = items_from_rules(&[rule("Quiet", "warning", "{}", vec![])], &[], &ctx);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].state, ItemState::Inactive);
        assert_eq!(items[0].severity, Severity::Warning);
    }

    #[test]
    fn test_alert_items() {
        let ctx = PluginContext::default();
        let r = rule(
            "PacketDrops",
            "critical",
            r#"{"threshold":"10","namespaceLabels":["namespace"]}"#,
            vec![
                alert(AlertState::Firing, "20", &[("namespace", "ns1")]),
                alert(AlertState::Pending, "15", &[("namespace", "ns2"), ("severity", "info")]),
            ],
        );
        let items = items_from_rules(&[r], &[], &ctx);
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].state, ItemState::Firing);
        assert_eq!(items[0].severity, Severity::Critical);
        assert_eq!(items[0].threshold, 10.0);
        assert_eq!(items[0].upper_bound, 100.0);
        assert_eq!(
            items[0].summary.as_deref(),
            Some("20% drops in ns1 {{ $labels.missing }}")
        );

        assert_eq!(items[1].state, ItemState::Pending);
        assert_eq!(items[1].severity, Severity::Info);
    }

    #[test]
    fn test_silenced_alert() {
        let ctx = PluginContext::default();
        let silence = Silence {
            id: "s1".to_string(),
            matchers: vec![
                SilenceMatcher {
                    name: "alertname".to_string(),
                    value: "PacketDrops".to_string(),
                    is_regex: false,
                    is_equal: true,
                },
                SilenceMatcher {
                    name: "namespace".to_string(),
                    value: "ns.*".to_string(),
                    is_regex: true,
                    is_equal: true,
                },
            ],
            status: SilenceStatus {
                state: "active".to_string(),
            },
        };
        let r = rule(
            "PacketDrops",
            "critical",
            "{}",
            vec![
                alert(AlertState::Firing, "20", &[("alertname", "PacketDrops"), ("namespace", "ns1")]),
                alert(AlertState::Firing, "20", &[("alertname", "PacketDrops"), ("namespace", "xns1")]),
            ],
        );
        let items = items_from_rules(&[r], &[silence], &ctx);
        assert_eq!(items[0].state, ItemState::Silenced);
        assert_eq!(items[1].state, ItemState::Firing);
    }

    #[test]
    fn test_invalid_regex_silence_never_matches() {
        let ctx = PluginContext::default();
        let matcher = |value: &str| SilenceMatcher {
            name: "namespace".to_string(),
            value: value.to_string(),
            is_regex: true,
            is_equal: true,
        };
        let silences = [
            Silence {
                id: "broken".to_string(),
                matchers: vec![matcher("ns(")],
                status: SilenceStatus {
                    state: "active".to_string(),
                },
            },
            Silence {
                id: "prod".to_string(),
                matchers: vec![matcher("prod-.+")],
                status: SilenceStatus {
                    state: "active".to_string(),
                },
            },
        ];
        let r = rule(
            "PacketDrops",
            "warning",
            "{}",
            vec![
                alert(AlertState::Firing, "20", &[("namespace", "ns(")]),
                alert(AlertState::Firing, "20", &[("namespace", "prod-a")]),
                alert(AlertState::Pending, "20", &[("namespace", "prod-b")]),
                alert(AlertState::Firing, "20", &[("namespace", "prod-")]),
            ],
        );
        let states: Vec<ItemState> = items_from_rules(&[r], &silences, &ctx)
            .iter()
            .map(|i| i.state)
            .collect();
        assert_eq!(
            states,
            vec![
                ItemState::Firing,
                ItemState::Silenced,
                ItemState::Silenced,
                ItemState::Firing,
            ]
        );
        assert!(!silences[0].silences(&labels(&[("namespace", "ns(")])));
    }

    #[test]
    fn test_expired_silence_ignored() {
        let silence = Silence {
            id: "s1".to_string(),
            matchers: vec![SilenceMatcher {
                name: "namespace".to_string(),
                value: "ns1".to_string(),
                is_regex: false,
                is_equal: false,
            }],
            status: SilenceStatus {
                state: "expired".to_string(),
            },
        };
        assert!(!silence.silences(&labels(&[("namespace", "ns2")])));
    }

    fn recording(metadata: &str, values: &[f64]) -> RecordingRule {
        RecordingRule {
            name: "DnsLatency".to_string(),
            annotations: HashMap::from([(HEALTH_ANNOTATION.to_string(), metadata.to_string())]),
            samples: values
                .iter()
                .map(|v| RecordingSample {
                    labels: labels(&[("namespace", "ns1")]),
                    value: *v,
                })
                .collect(),
        }
    }

    #[test]
    fn test_recording_tiers() {
        let ctx = PluginContext::default();
        let r = recording(
            r#"{"recordingThresholds":{"info":"10","warning":"20","critical":"50"}}"#,
            &[60.0, 50.0, 25.0, 10.0, 2.0],
        );
        let items = items_from_recording(&[r], &ctx);
        let tiers: Vec<(Severity, f64)> = items.iter().map(|i| (i.severity, i.threshold)).collect();
        assert_eq!(
            tiers,
            vec![
                (Severity::Critical, 50.0),
                (Severity::Critical, 50.0),
                (Severity::Warning, 20.0),
                (Severity::Info, 10.0),
                (Severity::Info, 10.0),
            ]
        );
        assert!(items.iter().all(|i| i.state == ItemState::Recording));
    }

    #[test]
    fn test_recording_below_single_tier() {
        let ctx = PluginContext::default();
        let r = recording(r#"{"recordingThresholds":{"warning":"20"}}"#, &[5.0]);
        let items = items_from_recording(&[r], &ctx);
        assert_eq!(items[0].severity, Severity::Warning);
        assert_eq!(items[0].state, ItemState::Recording);
    }

    #[test]
    fn test_recording_without_tiers() {
        let ctx = PluginContext::default();
        let items = items_from_recording(&[recording("{}", &[99.0])], &ctx);
        assert_eq!(items[0].severity, Severity::Info);
        assert_eq!(items[0].state, ItemState::Inactive);
    }
}
