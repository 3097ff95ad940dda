//! Graph elements produced by the topology builder

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::context::ScopeId;
use crate::health::HealthLevel;
use crate::model::peer::Peer;

/// Classification of a node within the active scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Cluster,
    Zone,
    Host,
    Namespace,
    Owner,
    Resource,
    Unknown,
}

impl From<ScopeId> for NodeType {
    fn from(scope: ScopeId) -> Self {
        match scope {
            ScopeId::Cluster => NodeType::Cluster,
            ScopeId::Zone => NodeType::Zone,
            ScopeId::Host => NodeType::Host,
            ScopeId::Namespace => NodeType::Namespace,
            ScopeId::Owner => NodeType::Owner,
            ScopeId::Resource => NodeType::Resource,
        }
    }
}

impl NodeType {
    /// Classify a peer for the scope
    pub fn classify(scope: ScopeId, peer: &Peer) -> Self {
        match scope {
            ScopeId::Owner if peer.owner.is_some() => NodeType::Owner,
            ScopeId::Owner => NodeType::Unknown,
            ScopeId::Resource => NodeType::Resource,
            other if peer.field(other).is_some() => other.into(),
            _ => NodeType::Unknown,
        }
    }

    /// Kind used to look up a badge
    pub fn badge_kind<'a>(&self, peer: &'a Peer) -> Option<&'a str> {
        match self {
            NodeType::Cluster => Some("Cluster"),
            NodeType::Zone => Some("Zone"),
            NodeType::Host => Some("Node"),
            NodeType::Namespace => Some("Namespace"),
            NodeType::Owner => peer.owner.as_ref().map(|o| o.kind.as_str()),
            NodeType::Resource => peer.resource_kind(),
            NodeType::Unknown => None,
        }
        .filter(|k| !k.is_empty())
    }
}

/// Peer resolved for the active scope
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub node_type: NodeType,
    pub peer: Peer,
    pub can_step_into: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeShape {
    Ellipse,
    Rectangle,
}

/// Badge colors for both themes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub light_color: String,
    pub dark_color: String,
}

impl Badge {
    pub fn new(text: &str, light_color: &str, dark_color: &str) -> Self {
        Self {
            text: text.to_string(),
            light_color: light_color.to_string(),
            dark_color: dark_color.to_string(),
        }
    }
}

/// Badge attached to a node, color resolved for the theme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBadge {
    pub text: String,
    pub color: String,
}

/// Resolves a badge from a resource kind
pub trait BadgeSource {
    fn badge(&self, kind: &str) -> Option<Badge>;
}

impl BadgeSource for HashMap<String, Badge> {
    fn badge(&self, kind: &str) -> Option<Badge> {
        self.get(kind).cloned()
    }
}

/// Badges for the common Kubernetes kinds
#[derive(Debug, Clone, Copy, Default)]
pub struct KubernetesBadges;

impl BadgeSource for KubernetesBadges {
    fn badge(&self, kind: &str) -> Option<Badge> {
        let (text, light, dark) = match kind {
            "Pod" => ("P", "#009596", "#73c5c5"),
            "Deployment" => ("D", "#0066cc", "#73bcf7"),
            "StatefulSet" => ("SS", "#0066cc", "#73bcf7"),
            "DaemonSet" => ("DS", "#0066cc", "#73bcf7"),
            "ReplicaSet" => ("RS", "#0066cc", "#73bcf7"),
            "Job" => ("J", "#5752d1", "#a18fff"),
            "CronJob" => ("CJ", "#5752d1", "#a18fff"),
            "Service" => ("S", "#3e8635", "#7cc674"),
            "Node" => ("N", "#8476d1", "#b2a3ff"),
            "Namespace" => ("NS", "#009596", "#73c5c5"),
            "Cluster" => ("C", "#6a6e73", "#b8bbbe"),
            "Zone" => ("Z", "#6a6e73", "#b8bbbe"),
            _ => return None,
        };
        Some(Badge::new(text, light, dark))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Health summary attached to a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthDecoration {
    pub score: f64,
    pub level: HealthLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeModel {
    pub id: String,
    pub node_type: NodeType,
    pub label: String,
    pub display_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_label: Option<String>,
    pub peer: Peer,
    pub shape: NodeShape,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<NodeBadge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub can_step_into: bool,
    #[serde(default)]
    pub no_metrics: bool,
    #[serde(default)]
    pub shadowed: bool,
    #[serde(default)]
    pub filtered: bool,
    #[serde(default)]
    pub highlighted: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub src_filtered: bool,
    #[serde(default)]
    pub dst_filtered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthDecoration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupModel {
    pub id: String,
    pub group_type: ScopeId,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Ids of child nodes and groups
    pub children: Vec<String>,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStyle {
    Dashed,
    Dotted,
}

/// Animation tiers, from still to fastest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimationSpeed {
    None,
    Slow,
    MediumSlow,
    Medium,
    MediumFast,
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStatus {
    Default,
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    None,
    Directional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeModel {
    pub id: String,
    pub source: String,
    pub target: String,
    pub stat: f64,
    pub dropped_stat: f64,
    pub style: EdgeStyle,
    pub animation: AnimationSpeed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub tag_status: TagStatus,
    pub start_terminal: Terminal,
    pub end_terminal: Terminal,
    #[serde(default)]
    pub shadowed: bool,
    #[serde(default)]
    pub highlighted: bool,
}

impl EdgeModel {
    /// Traffic was seen in both directions
    pub fn is_bidirectional(&self) -> bool {
        self.start_terminal == Terminal::Directional
    }

    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

/// Non-fatal problem met while generating a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

/// Output of the topology builder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyModel {
    pub nodes: Vec<NodeModel>,
    pub groups: Vec<GroupModel>,
    pub edges: Vec<EdgeModel>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl TopologyModel {
    pub fn node(&self, id: &str) -> Option<&NodeModel> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&GroupModel> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn edge_between(&self, a: &str, b: &str) -> Option<&EdgeModel> {
        self.edges.iter().find(|e| e.connects(a, b))
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::peer::{NameAndType, PeerFields};

    #[test]
    fn test_classify_owner_scope() {
        let with_owner: Peer = PeerFields {
            owner: Some(NameAndType::new("api", "Deployment")),
            ..Default::default()
        }
        .into();
        let without: Peer = PeerFields {
            namespace: Some("ns".to_string()),
            ..Default::default()
        }
        .into();
        assert_eq!(NodeType::classify(ScopeId::Owner, &with_owner), NodeType::Owner);
        assert_eq!(NodeType::classify(ScopeId::Owner, &without), NodeType::Unknown);
    }

    #[test]
    fn test_classify_resource_scope_always_resource() {
        let empty: Peer = PeerFields::default().into();
        assert_eq!(NodeType::classify(ScopeId::Resource, &empty), NodeType::Resource);
    }

    #[test]
    fn test_classify_by_field_presence() {
        let peer: Peer = PeerFields {
            host_name: Some("node-1".to_string()),
            ..Default::default()
        }
        .into();
        assert_eq!(NodeType::classify(ScopeId::Host, &peer), NodeType::Host);
        assert_eq!(NodeType::classify(ScopeId::Namespace, &peer), NodeType::Unknown);
    }

    #[test]
    fn test_kubernetes_badges() {
        assert_eq!(KubernetesBadges.badge("Pod").unwrap().text, "P");
        assert!(KubernetesBadges.badge("Gadget").is_none());
    }
}
