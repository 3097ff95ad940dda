//! Plugin context: scope and filter configuration shared by the topology
//! builder and the health aggregator.
//!
//! The context is created once when the plugin mounts and replaced through
//! [`PluginContext::update`] whenever the configuration is reloaded. Entry
//! points borrow it; nothing in the library keeps a global copy.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FlowError, Result};
use crate::health::metadata::HEALTH_ANNOTATION;
use crate::model::filters::FilterDefinition;
use crate::topology::GroupTypes;

/// Default path of the traffic page used to build health traffic links
pub const DEFAULT_TRAFFIC_PAGE: &str = "/netflow-traffic";

/// Aggregation scope of the topology, from the largest to the smallest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeId {
    Cluster,
    Zone,
    Host,
    Namespace,
    Owner,
    Resource,
}

impl ScopeId {
    pub const ALL: [ScopeId; 6] = [
        ScopeId::Cluster,
        ScopeId::Zone,
        ScopeId::Host,
        ScopeId::Namespace,
        ScopeId::Owner,
        ScopeId::Resource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeId::Cluster => "cluster",
            ScopeId::Zone => "zone",
            ScopeId::Host => "host",
            ScopeId::Namespace => "namespace",
            ScopeId::Owner => "owner",
            ScopeId::Resource => "resource",
        }
    }

    /// Plural name used in group type strings such as `clusters+namespaces`
    pub fn group_name(&self) -> &'static str {
        match self {
            ScopeId::Cluster => "clusters",
            ScopeId::Zone => "zones",
            ScopeId::Host => "hosts",
            ScopeId::Namespace => "namespaces",
            ScopeId::Owner => "owners",
            ScopeId::Resource => "resources",
        }
    }

    pub fn from_group_name(name: &str) -> Option<Self> {
        ScopeId::ALL.into_iter().find(|s| s.group_name() == name)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeId {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        ScopeId::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| FlowError::UnknownScope(s.to_string()))
    }
}

/// Scope metadata loaded from the plugin configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfigDef {
    pub id: ScopeId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Group type strings legal for this scope, e.g. `clusters+namespaces`
    #[serde(default)]
    pub groups: Vec<String>,
    /// Single symmetric filter id; makes the scope non-directional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Base ids of directional filters, prefixed with `src_`/`dst_` on use
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_into: Option<ScopeId>,
}

impl ScopeConfigDef {
    /// Definition used when a scope is requested but not configured
    pub fn bare(id: ScopeId) -> Self {
        Self {
            id,
            name: id.as_str().to_string(),
            short_name: None,
            description: None,
            groups: Vec::new(),
            filter: None,
            filters: Vec::new(),
            step_into: None,
        }
    }

    pub fn is_directional(&self) -> bool {
        self.filter.is_none()
    }

    /// Whether the grouping is legal for this scope. `none` and `auto` always are.
    pub fn allows_group(&self, groups: &GroupTypes) -> bool {
        match groups {
            GroupTypes::None | GroupTypes::Auto => true,
            GroupTypes::Scopes(_) => {
                let wanted = groups.to_string();
                self.groups.iter().any(|g| g == &wanted)
            }
        }
    }
}

/// Plugin configuration consumed by the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub scopes: Vec<ScopeConfigDef>,
    pub filter_definitions: Vec<FilterDefinition>,
    /// Page that traffic links in health items point to
    pub traffic_page_path: String,
    /// Rule annotation holding the JSON health metadata
    pub health_annotation: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            scopes: default_scopes(),
            filter_definitions: default_filter_definitions(),
            traffic_page_path: DEFAULT_TRAFFIC_PAGE.to_string(),
            health_annotation: HEALTH_ANNOTATION.to_string(),
        }
    }
}

impl PluginConfig {
    /// Check scope references and group type strings
    pub fn validate(&self) -> Result<()> {
        if self.scopes.is_empty() {
            return Err(FlowError::InvalidConfig("no scope defined".to_string()));
        }

        let mut seen = HashSet::new();
        for scope in &self.scopes {
            if !seen.insert(scope.id) {
                return Err(FlowError::InvalidConfig(format!(
                    "scope `{}` defined twice",
                    scope.id
                )));
            }
        }

        for scope in &self.scopes {
            if let Some(target) = scope.step_into {
                if !seen.contains(&target) {
                    return Err(FlowError::InvalidConfig(format!(
                        "scope `{}` steps into undefined scope `{}`",
                        scope.id, target
                    )));
                }
            }
            for group in &scope.groups {
                let parsed: GroupTypes = group.parse()?;
                if let GroupTypes::Scopes(levels) = &parsed {
                    if let Some(missing) = levels.iter().find(|l| !seen.contains(l)) {
                        return Err(FlowError::InvalidConfig(format!(
                            "scope `{}` groups by undefined scope `{}`",
                            scope.id, missing
                        )));
                    }
                }
            }
        }

        let mut filter_ids = HashSet::new();
        for def in &self.filter_definitions {
            if !filter_ids.insert(def.id.as_str()) {
                return Err(FlowError::InvalidConfig(format!(
                    "filter `{}` defined twice",
                    def.id
                )));
            }
        }

        Ok(())
    }
}

/// Explicit replacement for a process-wide configuration singleton
#[derive(Debug, Clone)]
pub struct PluginContext {
    config: PluginConfig,
    generation: u64,
}

impl Default for PluginContext {
    fn default() -> Self {
        Self {
            config: PluginConfig::default(),
            generation: 1,
        }
    }
}

impl PluginContext {
    /// Create the context at plugin mount
    pub fn new(config: PluginConfig) -> Result<Self> {
        config.validate()?;
        info!(
            event = "context_created",
            scopes = config.scopes.len(),
            filters = config.filter_definitions.len(),
            "Plugin context created"
        );
        Ok(Self {
            config,
            generation: 1,
        })
    }

    /// Swap in a reloaded configuration. An invalid configuration leaves the
    /// current one in place.
    pub fn update(&mut self, config: PluginConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.generation += 1;
        info!(
            event = "context_updated",
            generation = self.generation,
            "Plugin context updated"
        );
        Ok(())
    }

    /// Incremented on each successful update
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn scopes(&self) -> &[ScopeConfigDef] {
        &self.config.scopes
    }

    pub fn scope(&self, id: ScopeId) -> Option<&ScopeConfigDef> {
        self.config.scopes.iter().find(|s| s.id == id)
    }

    pub fn filter_definitions(&self) -> &[FilterDefinition] {
        &self.config.filter_definitions
    }

    pub fn traffic_page_path(&self) -> &str {
        &self.config.traffic_page_path
    }

    pub fn health_annotation(&self) -> &str {
        &self.config.health_annotation
    }
}

fn scope(
    id: ScopeId,
    name: &str,
    groups: &[&str],
    filter: Option<&str>,
    filters: &[&str],
    step_into: Option<ScopeId>,
) -> ScopeConfigDef {
    ScopeConfigDef {
        id,
        name: name.to_string(),
        short_name: None,
        description: None,
        groups: groups.iter().map(|g| g.to_string()).collect(),
        filter: filter.map(str::to_string),
        filters: filters.iter().map(|f| f.to_string()).collect(),
        step_into,
    }
}

/// Standard flow scopes, cluster to resource
pub fn default_scopes() -> Vec<ScopeConfigDef> {
    vec![
        scope(
            ScopeId::Cluster,
            "Cluster",
            &["none"],
            Some("cluster_name"),
            &[],
            Some(ScopeId::Zone),
        ),
        scope(
            ScopeId::Zone,
            "Zone",
            &["none", "clusters"],
            None,
            &["zone"],
            Some(ScopeId::Host),
        ),
        scope(
            ScopeId::Host,
            "Node",
            &["none", "clusters", "zones", "clusters+zones"],
            None,
            &["host_name"],
            Some(ScopeId::Namespace),
        ),
        scope(
            ScopeId::Namespace,
            "Namespace",
            &[
                "none",
                "clusters",
                "zones",
                "clusters+zones",
                "hosts",
                "clusters+hosts",
                "zones+hosts",
            ],
            None,
            &["namespace"],
            Some(ScopeId::Owner),
        ),
        scope(
            ScopeId::Owner,
            "Owner",
            &[
                "none",
                "clusters",
                "zones",
                "hosts",
                "namespaces",
                "clusters+namespaces",
                "clusters+hosts",
                "hosts+namespaces",
                "clusters+hosts+namespaces",
            ],
            None,
            &["namespace", "owner_name"],
            Some(ScopeId::Resource),
        ),
        scope(
            ScopeId::Resource,
            "Resource",
            &[
                "none",
                "clusters",
                "zones",
                "hosts",
                "namespaces",
                "owners",
                "clusters+namespaces",
                "hosts+namespaces",
                "namespaces+owners",
                "hosts+owners",
                "clusters+namespaces+owners",
                "hosts+namespaces+owners",
            ],
            None,
            &["resource"],
            None,
        ),
    ]
}

/// Filter definitions matching [`default_scopes`]
pub fn default_filter_definitions() -> Vec<FilterDefinition> {
    let mut defs = vec![FilterDefinition::new("cluster_name", "Cluster")];
    for (base, name) in [
        ("zone", "Zone"),
        ("host_name", "Node Name"),
        ("namespace", "Namespace"),
        ("owner_name", "Owner Name"),
        ("resource", "Resource"),
        ("address", "IP"),
    ] {
        defs.push(FilterDefinition::new(
            format!("src_{base}"),
            format!("Source {name}"),
        ));
        defs.push(FilterDefinition::new(
            format!("dst_{base}"),
            format!("Destination {name}"),
        ));
    }
    defs
}
