//! Traffic endpoints and their canonical identities

use serde::{Deserialize, Serialize};

use crate::context::ScopeId;

/// Id shared by every peer that has no identifying field
pub const UNKNOWN_PEER_ID: &str = "unknown";

/// Kubernetes object reference by name and kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameAndType {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl NameAndType {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// Raw endpoint fields, as found in metric labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<NameAndType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<NameAndType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

/// Traffic endpoint with its derived id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PeerFields")]
pub struct Peer {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<NameAndType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<NameAndType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn non_empty_ref(value: Option<NameAndType>) -> Option<NameAndType> {
    value.filter(|v| !v.name.is_empty())
}

impl From<PeerFields> for Peer {
    fn from(fields: PeerFields) -> Self {
        let fields = PeerFields {
            cluster: non_empty(fields.cluster),
            zone: non_empty(fields.zone),
            host_name: non_empty(fields.host_name),
            namespace: non_empty(fields.namespace),
            owner: non_empty_ref(fields.owner),
            resource: non_empty_ref(fields.resource),
            addr: non_empty(fields.addr),
        };
        Self {
            id: peer_id(&fields),
            cluster: fields.cluster,
            zone: fields.zone,
            host_name: fields.host_name,
            namespace: fields.namespace,
            owner: fields.owner,
            resource: fields.resource,
            addr: fields.addr,
        }
    }
}

impl Peer {
    pub fn new(fields: PeerFields) -> Self {
        fields.into()
    }

    /// Peer known only by the value of a single scope field, used for
    /// placeholder nodes
    pub fn from_scope_label(scope: ScopeId, label: &str) -> Self {
        let value = Some(label.to_string());
        let mut fields = PeerFields::default();
        match scope {
            ScopeId::Cluster => fields.cluster = value,
            ScopeId::Zone => fields.zone = value,
            ScopeId::Host => fields.host_name = value,
            ScopeId::Namespace => fields.namespace = value,
            ScopeId::Owner => fields.owner = Some(NameAndType::new(label, "")),
            ScopeId::Resource => fields.resource = Some(NameAndType::new(label, "")),
        }
        fields.into()
    }

    pub fn fields(&self) -> PeerFields {
        PeerFields {
            cluster: self.cluster.clone(),
            zone: self.zone.clone(),
            host_name: self.host_name.clone(),
            namespace: self.namespace.clone(),
            owner: self.owner.clone(),
            resource: self.resource.clone(),
            addr: self.addr.clone(),
        }
    }

    /// Value of the field a scope aggregates on
    pub fn field(&self, scope: ScopeId) -> Option<&str> {
        match scope {
            ScopeId::Cluster => self.cluster.as_deref(),
            ScopeId::Zone => self.zone.as_deref(),
            ScopeId::Host => self.host_name.as_deref(),
            ScopeId::Namespace => self.namespace.as_deref(),
            ScopeId::Owner => self.owner.as_ref().map(|o| o.name.as_str()),
            ScopeId::Resource => self
                .resource
                .as_ref()
                .map(|r| r.name.as_str())
                .or(self.addr.as_deref()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.id == UNKNOWN_PEER_ID
    }

    pub fn resource_kind(&self) -> Option<&str> {
        self.resource.as_ref().map(|r| r.kind.as_str())
    }
}

/// Canonical id from host, namespace, owner, resource and address, in that
/// order. Peers with none of them share [`UNKNOWN_PEER_ID`]; equal fields
/// always give equal ids.
pub fn peer_id(fields: &PeerFields) -> String {
    let mut segments = Vec::with_capacity(5);
    if let Some(host) = &fields.host_name {
        segments.push(format!("h={host}"));
    }
    if let Some(ns) = &fields.namespace {
        segments.push(format!("n={ns}"));
    }
    if let Some(owner) = &fields.owner {
        segments.push(format!("o={}.{}", owner.kind, owner.name));
    }
    if let Some(resource) = &fields.resource {
        segments.push(format!("r={}.{}", resource.kind, resource.name));
    }
    if let Some(addr) = &fields.addr {
        segments.push(format!("a={addr}"));
    }
    join_or_unknown(segments)
}

/// Group identity: the peer scheme restricted to grouping fields, with
/// cluster and zone segments in front
pub fn group_id(fields: &PeerFields) -> String {
    let mut segments = Vec::with_capacity(5);
    if let Some(cluster) = &fields.cluster {
        segments.push(format!("c={cluster}"));
    }
    if let Some(zone) = &fields.zone {
        segments.push(format!("z={zone}"));
    }
    if let Some(host) = &fields.host_name {
        segments.push(format!("h={host}"));
    }
    if let Some(ns) = &fields.namespace {
        segments.push(format!("n={ns}"));
    }
    if let Some(owner) = &fields.owner {
        segments.push(format!("o={}.{}", owner.kind, owner.name));
    }
    join_or_unknown(segments)
}

fn join_or_unknown(segments: Vec<String>) -> String {
    if segments.is_empty() {
        UNKNOWN_PEER_ID.to_string()
    } else {
        segments.join(",")
    }
}
