//! Flow filters: matching topology elements against the active filter set
//! and toggling element filters.
//!
//! Toggling never mutates its input. On any lookup failure the error is
//! logged and returned, and the caller keeps its current filter list.

use serde::{Deserialize, Serialize};
use tracing::error;

use super::peer::Peer;
use crate::context::ScopeConfigDef;
use crate::error::{FlowError, Result};
use crate::topology::NodeType;

/// Filter ids replaced rather than extended on insertion
const SINGLE_SELECT_FILTERS: [&str; 2] = ["src_resource", "dst_resource"];

/// Base id used for peers that only have an address
const ADDRESS_FILTER: &str = "address";

/// Filter definition from the plugin configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub id: String,
    pub name: String,
}

impl FilterDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterValue {
    pub v: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl FilterValue {
    pub fn new(v: impl Into<String>) -> Self {
        Self {
            v: v.into(),
            display: None,
        }
    }
}

/// Active filter: a definition and its selected values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub def: FilterDefinition,
    pub values: Vec<FilterValue>,
}

impl Filter {
    fn has_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| v.v == value)
    }
}

/// Side of a flow a directional filter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterDir {
    #[serde(rename = "src")]
    Source,
    #[serde(rename = "dst")]
    Destination,
}

impl FilterDir {
    pub fn prefix(&self) -> &'static str {
        match self {
            FilterDir::Source => "src_",
            FilterDir::Destination => "dst_",
        }
    }
}

/// Value of a base filter id on a peer
fn peer_filter_value(base_id: &str, peer: &Peer) -> Option<String> {
    match base_id {
        "cluster_name" => peer.cluster.clone(),
        "zone" => peer.zone.clone(),
        "host_name" => peer.host_name.clone(),
        "namespace" => peer.namespace.clone(),
        "owner_name" => peer.owner.as_ref().map(|o| o.name.clone()),
        "kind" => peer.resource.as_ref().map(|r| r.kind.clone()),
        "name" => peer.resource.as_ref().map(|r| r.name.clone()),
        "resource" => peer.resource.as_ref().map(|r| match &peer.namespace {
            Some(ns) => format!("{}.{}.{}", r.kind, ns, r.name),
            None => format!("{}.{}", r.kind, r.name),
        }),
        ADDRESS_FILTER => peer.addr.clone(),
        _ => None,
    }
}

/// `(base id, value)` pairs identifying an element for filtering
fn element_filter_kvs(scope: &ScopeConfigDef, node_type: NodeType, peer: &Peer) -> Vec<(String, String)> {
    if node_type == NodeType::Unknown {
        return Vec::new();
    }

    let base_ids: Vec<&str> = match &scope.filter {
        Some(id) => vec![id.as_str()],
        None => scope.filters.iter().map(String::as_str).collect(),
    };
    let kvs: Vec<(String, String)> = base_ids
        .into_iter()
        .filter_map(|id| peer_filter_value(id, peer).map(|v| (id.to_string(), v)))
        .collect();

    if kvs.is_empty() {
        if let Some(addr) = &peer.addr {
            return vec![(ADDRESS_FILTER.to_string(), addr.clone())];
        }
    }
    kvs
}

fn full_ids(kvs: Vec<(String, String)>, dir: Option<FilterDir>) -> Vec<(String, String)> {
    match dir {
        Some(dir) => kvs
            .into_iter()
            .map(|(id, v)| (format!("{}{}", dir.prefix(), id), v))
            .collect(),
        None => kvs,
    }
}

fn kvs_for(
    scope: &ScopeConfigDef,
    node_type: NodeType,
    peer: &Peer,
    dir: Option<FilterDir>,
) -> Vec<(String, String)> {
    // non-directional scopes ignore the requested side
    let dir = if scope.is_directional() { dir } else { None };
    full_ids(element_filter_kvs(scope, node_type, peer), dir)
}

fn all_filtered(kvs: &[(String, String)], filters: &[Filter]) -> bool {
    !kvs.is_empty()
        && kvs.iter().all(|(id, value)| {
            filters
                .iter()
                .any(|f| &f.def.id == id && f.has_value(value))
        })
}

/// Whether every filter key of the element is active on the given side
pub fn is_dir_element_filtered(
    scope: &ScopeConfigDef,
    node_type: NodeType,
    peer: &Peer,
    dir: FilterDir,
    filters: &[Filter],
) -> bool {
    all_filtered(&kvs_for(scope, node_type, peer, Some(dir)), filters)
}

/// Non-directional counterpart of [`is_dir_element_filtered`]
pub fn is_element_filtered(
    scope: &ScopeConfigDef,
    node_type: NodeType,
    peer: &Peer,
    filters: &[Filter],
) -> bool {
    all_filtered(&kvs_for(scope, node_type, peer, None), filters)
}

/// Add or remove the element's filters on one side of the flow.
///
/// `is_filtered` tells the current state: `true` removes, `false` adds.
pub fn toggle_dir_element_filter(
    scope: &ScopeConfigDef,
    node_type: NodeType,
    peer: &Peer,
    dir: FilterDir,
    is_filtered: bool,
    filters: &[Filter],
    definitions: &[FilterDefinition],
) -> Result<Vec<Filter>> {
    let kvs = kvs_for(scope, node_type, peer, Some(dir));
    toggle(scope, kvs, is_filtered, filters, definitions)
}

/// Add or remove the element's filters, ignoring direction
pub fn toggle_element_filter(
    scope: &ScopeConfigDef,
    node_type: NodeType,
    peer: &Peer,
    is_filtered: bool,
    filters: &[Filter],
    definitions: &[FilterDefinition],
) -> Result<Vec<Filter>> {
    let kvs = kvs_for(scope, node_type, peer, None);
    toggle(scope, kvs, is_filtered, filters, definitions)
}

fn toggle(
    scope: &ScopeConfigDef,
    kvs: Vec<(String, String)>,
    is_filtered: bool,
    filters: &[Filter],
    definitions: &[FilterDefinition],
) -> Result<Vec<Filter>> {
    if kvs.is_empty() {
        error!(scope = %scope.id, "Element has no filterable field");
        return Err(FlowError::NoFilterableField(scope.id));
    }

    // resolve every definition before touching anything
    let mut resolved = Vec::with_capacity(kvs.len());
    for (id, value) in kvs {
        match definitions.iter().find(|d| d.id == id) {
            Some(def) => resolved.push((def, value)),
            None => {
                error!(filter = %id, "Filter definition not found");
                return Err(FlowError::UnknownFilterDefinition(id));
            }
        }
    }

    let mut result = filters.to_vec();
    for (def, value) in resolved {
        let existing = result.iter().position(|f| f.def.id == def.id);
        if is_filtered {
            if let Some(idx) = existing {
                result[idx].values.retain(|v| v.v != value);
            }
            continue;
        }

        let idx = existing.unwrap_or_else(|| {
            result.push(Filter {
                def: def.clone(),
                values: Vec::new(),
            });
            result.len() - 1
        });
        let filter = &mut result[idx];
        if SINGLE_SELECT_FILTERS.contains(&def.id.as_str()) {
            filter.values = vec![FilterValue::new(value)];
        } else if !filter.has_value(&value) {
            filter.values.push(FilterValue::new(value));
        }
    }

    result.retain(|f| !f.values.is_empty());
    Ok(result)
}
