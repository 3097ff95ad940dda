//! Topology display options

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::context::{ScopeConfigDef, ScopeId};
use crate::error::{FlowError, Result};
use crate::model::metrics::{MetricFunction, MetricType};

/// How nodes are nested into groups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GroupTypes {
    #[default]
    None,
    /// Pick a grouping from the scope definition
    Auto,
    /// Explicit levels, largest first
    Scopes(Vec<ScopeId>),
}

impl GroupTypes {
    /// Levels to apply for `scope`, largest first.
    ///
    /// `auto` picks namespaces when legal, else clusters, else nothing.
    pub fn resolve(&self, scope: &ScopeConfigDef) -> Vec<ScopeId> {
        match self {
            GroupTypes::None => Vec::new(),
            GroupTypes::Scopes(levels) => levels.clone(),
            GroupTypes::Auto => [ScopeId::Namespace, ScopeId::Cluster]
                .into_iter()
                .find(|level| scope.allows_group(&GroupTypes::Scopes(vec![*level])))
                .map(|level| vec![level])
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for GroupTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupTypes::None => f.write_str("none"),
            GroupTypes::Auto => f.write_str("auto"),
            GroupTypes::Scopes(levels) => {
                let names: Vec<&str> = levels.iter().map(|l| l.group_name()).collect();
                f.write_str(&names.join("+"))
            }
        }
    }
}

impl FromStr for GroupTypes {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "" => Ok(GroupTypes::None),
            "auto" => Ok(GroupTypes::Auto),
            _ => {
                let mut levels = s
                    .split('+')
                    .map(|part| {
                        ScopeId::from_group_name(part.trim())
                            .ok_or_else(|| FlowError::InvalidGroupTypes(s.to_string()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                levels.sort();
                levels.dedup();
                Ok(GroupTypes::Scopes(levels))
            }
        }
    }
}

impl Serialize for GroupTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GroupTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Maximum label length before truncation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TruncateLength {
    Off,
    Xs,
    S,
    #[default]
    M,
    L,
    Xl,
}

impl TruncateLength {
    pub fn chars(&self) -> usize {
        match self {
            TruncateLength::Off => 0,
            TruncateLength::Xs => 10,
            TruncateLength::S => 20,
            TruncateLength::M => 25,
            TruncateLength::L => 30,
            TruncateLength::Xl => 40,
        }
    }

    /// Cut `label` to the configured length, marking the cut with an ellipsis
    pub fn apply(&self, label: &str) -> String {
        let max = self.chars();
        if max == 0 || label.chars().count() <= max {
            return label.to_string();
        }
        let mut truncated: String = label.chars().take(max).collect();
        truncated.push('…');
        truncated
    }
}

/// Options read by the topology builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyOptions {
    /// Largest stat in view, used for animation and tag tiers
    pub max_edge_stat: f64,
    pub node_badges: bool,
    pub edges: bool,
    pub edge_tags: bool,
    pub start_collapsed: bool,
    pub truncate_length: TruncateLength,
    pub group_types: GroupTypes,
    pub metric_function: MetricFunction,
    pub metric_type: MetricType,
}

impl Default for TopologyOptions {
    fn default() -> Self {
        Self {
            max_edge_stat: 0.0,
            node_badges: true,
            edges: true,
            edge_tags: true,
            start_collapsed: false,
            truncate_length: TruncateLength::M,
            group_types: GroupTypes::None,
            metric_function: MetricFunction::Sum,
            metric_type: MetricType::Bytes,
        }
    }
}
