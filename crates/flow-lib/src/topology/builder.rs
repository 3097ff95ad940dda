//! Topology model generation
//!
//! Turns metric records into nodes, nested groups and merged edges for one
//! refresh cycle. The steps run in a fixed order:
//!
//! 1. classify both peers of every record for the active scope
//! 2. collapse address-only peers onto the node hosting the opposite pod
//! 3. insert nodes and their groups, largest grouping level first
//! 4. upsert edges on the unordered peer pair
//! 5. derive search, highlight and filter state
//! 6. prune empty groups
//! 7. add placeholders for expected nodes without traffic

use std::collections::HashMap;

use tracing::debug;

use super::decorate::{animation_speed, edge_style, edge_tag, tag_status};
use super::elements::{
    BadgeSource, Diagnostic, DiagnosticLevel, EdgeModel, GroupModel, KubernetesBadges, NodeBadge,
    NodeData, NodeModel, NodeShape, NodeType, Terminal, TopologyModel,
};
use super::options::TopologyOptions;
use crate::context::{PluginContext, ScopeConfigDef, ScopeId};
use crate::model::filters::{is_dir_element_filtered, Filter, FilterDir};
use crate::model::metrics::{get_stat, StatsBag, TopologyMetrics};
use crate::model::peer::{group_id, Peer, PeerFields, UNKNOWN_PEER_ID};

/// Label of nodes without any identifying field
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Builds a [`TopologyModel`] for one scope
pub struct TopologyModelBuilder<'a> {
    ctx: &'a PluginContext,
    options: &'a TopologyOptions,
    scope: ScopeId,
    search: String,
    highlighted: Option<String>,
    filters: &'a [Filter],
    badges: &'a dyn BadgeSource,
    expected_nodes: Vec<String>,
    dark_mode: bool,
}

impl<'a> TopologyModelBuilder<'a> {
    pub fn new(ctx: &'a PluginContext, options: &'a TopologyOptions, scope: ScopeId) -> Self {
        Self {
            ctx,
            options,
            scope,
            search: String::new(),
            highlighted: None,
            filters: &[],
            badges: &KubernetesBadges,
            expected_nodes: Vec::new(),
            dark_mode: false,
        }
    }

    /// Case-insensitive search term matched on node labels
    pub fn search(mut self, value: impl Into<String>) -> Self {
        self.search = value.into().trim().to_lowercase();
        self
    }

    /// Id of the highlighted node or edge
    pub fn highlighted(mut self, id: Option<String>) -> Self {
        self.highlighted = id;
        self
    }

    pub fn filters(mut self, filters: &'a [Filter]) -> Self {
        self.filters = filters;
        self
    }

    pub fn badges(mut self, badges: &'a dyn BadgeSource) -> Self {
        self.badges = badges;
        self
    }

    /// Labels of nodes known to exist even without traffic
    pub fn expected_nodes(mut self, labels: Vec<String>) -> Self {
        self.expected_nodes = labels;
        self
    }

    pub fn dark_mode(mut self, dark: bool) -> Self {
        self.dark_mode = dark;
        self
    }

    pub fn build(&self, metrics: &[TopologyMetrics], dropped: &[TopologyMetrics]) -> TopologyModel {
        let mut diagnostics = Vec::new();

        let scope_def = match self.ctx.scope(self.scope) {
            Some(def) => def.clone(),
            None => {
                push_diagnostic(
                    &mut diagnostics,
                    DiagnosticLevel::Error,
                    format!("scope `{}` is not configured", self.scope),
                );
                ScopeConfigDef::bare(self.scope)
            }
        };

        let levels = if scope_def.allows_group(&self.options.group_types) {
            self.options.group_types.resolve(&scope_def)
        } else {
            push_diagnostic(
                &mut diagnostics,
                DiagnosticLevel::Warning,
                format!(
                    "grouping `{}` is not available for scope `{}`",
                    self.options.group_types, self.scope
                ),
            );
            Vec::new()
        };

        let mut state = ModelState {
            builder: self,
            scope_def,
            levels,
            nodes: Vec::new(),
            node_index: HashMap::new(),
            groups: Vec::new(),
            group_index: HashMap::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
            diagnostics,
        };

        let hosts = HostIndex::new(metrics);
        let scope = state.scope_def.id;
        let dropped_stats: HashMap<(String, String), &StatsBag> = dropped
            .iter()
            .map(|d| ((scoped_id(scope, &d.source), scoped_id(scope, &d.destination)), &d.stats))
            .collect();
        let function = self.options.metric_function;

        for record in metrics {
            let source = hosts.collapse(&record.source, &record.destination);
            let destination = hosts.collapse(&record.destination, &record.source);

            let source_id = state.add_peer(source, false);
            let destination_id = state.add_peer(destination, false);

            if self.options.edges && source_id != destination_id {
                let stat = get_stat(&record.stats, function);
                let dropped_stat = dropped_stats
                    .get(&(
                        scoped_id(scope, &record.source),
                        scoped_id(scope, &record.destination),
                    ))
                    .map(|s| get_stat(s, function))
                    .unwrap_or(0.0);
                state.upsert_edge(source_id, destination_id, stat, dropped_stat);
            }
        }

        state.prune_empty_groups();
        state.add_expected_nodes();
        state.decorate_edges();

        debug!(
            scope = %self.scope,
            records = metrics.len(),
            nodes = state.nodes.len(),
            groups = state.groups.len(),
            edges = state.edges.len(),
            "Topology model generated"
        );

        TopologyModel {
            nodes: state.nodes,
            groups: state.groups,
            edges: state.edges,
            diagnostics: state.diagnostics,
        }
    }
}

/// Positional form of [`TopologyModelBuilder`]
#[allow(clippy::too_many_arguments)]
pub fn generate_data_model(
    metrics: &[TopologyMetrics],
    dropped: &[TopologyMetrics],
    options: &TopologyOptions,
    scope: ScopeId,
    ctx: &PluginContext,
    search: &str,
    highlighted: Option<&str>,
    filters: &[Filter],
    badges: &dyn BadgeSource,
    expected_nodes: &[String],
    dark_mode: bool,
) -> TopologyModel {
    TopologyModelBuilder::new(ctx, options, scope)
        .search(search)
        .highlighted(highlighted.map(str::to_string))
        .filters(filters)
        .badges(badges)
        .expected_nodes(expected_nodes.to_vec())
        .dark_mode(dark_mode)
        .build(metrics, dropped)
}

/// Node id of `peer` in the active scope.
///
/// Cluster and zone nodes usually have no identifying field, so their id is
/// derived from the scope. The `cluster:` and `zone:` prefixes keep those ids
/// apart from group ids.
fn node_id(node_type: NodeType, peer: &Peer) -> String {
    if !peer.is_unknown() {
        return peer.id.clone();
    }
    match (node_type, peer.cluster.as_deref()) {
        (NodeType::Cluster, Some(cluster)) => format!("cluster:{cluster}"),
        (NodeType::Zone, _) => {
            let fields = PeerFields {
                cluster: peer.cluster.clone(),
                zone: peer.zone.clone(),
                ..PeerFields::default()
            };
            format!("zone:{}", group_id(&fields))
        }
        _ => peer.id.clone(),
    }
}

fn scoped_id(scope: ScopeId, peer: &Peer) -> String {
    node_id(NodeType::classify(scope, peer), peer)
}

fn push_diagnostic(diagnostics: &mut Vec<Diagnostic>, level: DiagnosticLevel, message: String) {
    if diagnostics.iter().any(|d| d.message == message) {
        return;
    }
    debug!(event = "topology_diagnostic", level = ?level, %message);
    diagnostics.push(Diagnostic { level, message });
}

/// `Node` peers by cluster and name, for routing collapse
struct HostIndex<'m> {
    nodes: HashMap<(Option<&'m str>, &'m str), &'m Peer>,
}

impl<'m> HostIndex<'m> {
    fn new(metrics: &'m [TopologyMetrics]) -> Self {
        let mut nodes = HashMap::new();
        for record in metrics {
            for peer in [&record.source, &record.destination] {
                if let Some(resource) = peer.resource.as_ref().filter(|r| r.kind == "Node") {
                    nodes
                        .entry((peer.cluster.as_deref(), resource.name.as_str()))
                        .or_insert(peer);
                }
            }
        }
        Self { nodes }
    }

    /// The node peer standing for `current` when `current` is only an
    /// address owned by the host of the pod on the other side
    fn collapse(&self, current: &'m Peer, opposite: &'m Peer) -> &'m Peer {
        if current.resource.is_some() || opposite.resource_kind() != Some("Pod") {
            return current;
        }
        if opposite.cluster != current.cluster {
            return current;
        }
        let (Some(addr), Some(host)) = (current.addr.as_deref(), opposite.host_name.as_deref())
        else {
            return current;
        };
        match self.nodes.get(&(opposite.cluster.as_deref(), host)) {
            Some(&node) if node.addr.as_deref() == Some(addr) => node,
            _ => current,
        }
    }
}

struct ModelState<'b, 'a> {
    builder: &'b TopologyModelBuilder<'a>,
    scope_def: ScopeConfigDef,
    levels: Vec<ScopeId>,
    nodes: Vec<NodeModel>,
    node_index: HashMap<String, usize>,
    groups: Vec<GroupModel>,
    group_index: HashMap<String, usize>,
    edges: Vec<EdgeModel>,
    edge_index: HashMap<(String, String), usize>,
    diagnostics: Vec<Diagnostic>,
}

impl ModelState<'_, '_> {
    fn diagnostic(&mut self, level: DiagnosticLevel, message: String) {
        push_diagnostic(&mut self.diagnostics, level, message);
    }

    /// Insert the node for `peer` and its groups; returns the node id
    fn add_peer(&mut self, peer: &Peer, placeholder: bool) -> String {
        let node_type = NodeType::classify(self.scope_def.id, peer);
        let id = node_id(node_type, peer);
        // unknown peers share one id, so they cannot sit in a group
        let parent = if node_type == NodeType::Unknown || id == UNKNOWN_PEER_ID {
            None
        } else {
            self.add_groups(peer)
        };

        if !self.node_index.contains_key(&id) {
            let data = NodeData {
                node_type,
                peer: peer.clone(),
                can_step_into: !placeholder
                    && node_type != NodeType::Unknown
                    && self.scope_def.step_into.is_some(),
            };
            let mut node = self.create_node(id.clone(), data);
            node.no_metrics = placeholder;
            self.node_index.insert(id.clone(), self.nodes.len());
            self.nodes.push(node);
        }

        if let Some(parent) = parent {
            self.link(&parent, &id, false);
        }
        id
    }

    /// Resolve the group chain of `peer`; returns the innermost group id
    fn add_groups(&mut self, peer: &Peer) -> Option<String> {
        let mut fields = PeerFields::default();
        let mut parent: Option<String> = None;

        for level in self.levels.clone() {
            let Some(label) = peer.field(level) else {
                continue;
            };
            match level {
                ScopeId::Cluster => fields.cluster = peer.cluster.clone(),
                ScopeId::Zone => fields.zone = peer.zone.clone(),
                ScopeId::Host => fields.host_name = peer.host_name.clone(),
                ScopeId::Namespace => fields.namespace = peer.namespace.clone(),
                ScopeId::Owner => {
                    fields.owner = peer.owner.clone();
                    // owner names are only unique within a namespace
                    if fields.namespace.is_none() {
                        fields.namespace = peer.namespace.clone();
                    }
                }
                ScopeId::Resource => continue,
            }

            let id = group_id(&fields);
            if !self.group_index.contains_key(&id) {
                self.group_index.insert(id.clone(), self.groups.len());
                self.groups.push(GroupModel {
                    id: id.clone(),
                    group_type: level,
                    label: label.to_string(),
                    parent: None,
                    children: Vec::new(),
                    collapsed: self.builder.options.start_collapsed,
                    position: None,
                });
            }
            if let Some(parent_id) = &parent {
                self.link(parent_id, &id, true);
            }
            parent = Some(id);
        }

        parent
    }

    /// Attach a child node or group to a group
    fn link(&mut self, parent_id: &str, child_id: &str, child_is_group: bool) {
        if parent_id == child_id {
            self.diagnostic(
                DiagnosticLevel::Error,
                format!("group `{parent_id}` cannot contain itself"),
            );
            return;
        }

        let current = if child_is_group {
            self.group_index
                .get(child_id)
                .and_then(|&i| self.groups[i].parent.clone())
        } else {
            self.node_index
                .get(child_id)
                .and_then(|&i| self.nodes[i].parent.clone())
        };
        if let Some(current) = current {
            if current != parent_id {
                self.diagnostic(
                    DiagnosticLevel::Warning,
                    format!("`{child_id}` already belongs to `{current}`, not moved to `{parent_id}`"),
                );
            }
            return;
        }

        let Some(&parent_idx) = self.group_index.get(parent_id) else {
            return;
        };
        if child_is_group {
            if let Some(&i) = self.group_index.get(child_id) {
                self.groups[i].parent = Some(parent_id.to_string());
            }
        } else if let Some(&i) = self.node_index.get(child_id) {
            self.nodes[i].parent = Some(parent_id.to_string());
        }
        let children = &mut self.groups[parent_idx].children;
        if !children.iter().any(|c| c == child_id) {
            children.push(child_id.to_string());
        }
    }

    fn create_node(&self, id: String, data: NodeData) -> NodeModel {
        let builder = self.builder;
        let NodeData {
            node_type,
            peer,
            can_step_into,
        } = data;

        let label = node_label(node_type, &peer);
        let secondary_label = match node_type {
            NodeType::Owner | NodeType::Resource if !self.levels.contains(&ScopeId::Namespace) => {
                peer.namespace.clone()
            }
            _ => None,
        };

        let matches = |text: &str| text.to_lowercase().contains(&builder.search);
        let shadowed = !builder.search.is_empty()
            && !matches(&label)
            && !secondary_label.as_deref().map(matches).unwrap_or(false);
        let filtered = !builder.search.is_empty() && !shadowed;
        let highlighted = !shadowed && builder.highlighted.as_deref() == Some(id.as_str());

        let badge = node_type
            .badge_kind(&peer)
            .and_then(|kind| builder.badges.badge(kind));
        let shape = if badge.is_some() {
            NodeShape::Ellipse
        } else {
            NodeShape::Rectangle
        };
        let badge = badge
            .filter(|_| builder.options.node_badges)
            .map(|b| NodeBadge {
                text: b.text,
                color: if builder.dark_mode {
                    b.dark_color
                } else {
                    b.light_color
                },
            });

        let src_filtered = is_dir_element_filtered(
            &self.scope_def,
            node_type,
            &peer,
            FilterDir::Source,
            builder.filters,
        );
        let dst_filtered = is_dir_element_filtered(
            &self.scope_def,
            node_type,
            &peer,
            FilterDir::Destination,
            builder.filters,
        );

        NodeModel {
            id,
            node_type,
            display_label: builder.options.truncate_length.apply(&label),
            label,
            secondary_label,
            peer,
            shape,
            badge,
            parent: None,
            can_step_into,
            no_metrics: false,
            shadowed,
            filtered,
            highlighted,
            pinned: false,
            src_filtered,
            dst_filtered,
            position: None,
            health: None,
        }
    }

    fn upsert_edge(&mut self, source: String, target: String, stat: f64, dropped_stat: f64) {
        let index = if let Some(&i) = self.edge_index.get(&(source.clone(), target.clone())) {
            i
        } else if let Some(&i) = self.edge_index.get(&(target.clone(), source.clone())) {
            self.edges[i].start_terminal = Terminal::Directional;
            i
        } else {
            self.edge_index
                .insert((source.clone(), target.clone()), self.edges.len());
            self.edges.push(EdgeModel {
                id: format!("{source}~{target}"),
                source,
                target,
                stat: 0.0,
                dropped_stat: 0.0,
                style: edge_style(0.0),
                animation: animation_speed(0.0, 0.0),
                tag: None,
                tag_status: tag_status(0.0, 0.0),
                start_terminal: Terminal::None,
                end_terminal: Terminal::Directional,
                shadowed: false,
                highlighted: false,
            });
            self.edges.len() - 1
        };

        let options = self.builder.options;
        let edge = &mut self.edges[index];
        edge.stat = stat;
        edge.dropped_stat = dropped_stat;
        edge.style = edge_style(stat);
        edge.animation = animation_speed(stat, options.max_edge_stat);
        edge.tag = edge_tag(stat, options);
        edge.tag_status = tag_status(stat, options.max_edge_stat);
    }

    /// Remove groups without children until none is left, so that a group
    /// holding only empty groups goes too
    fn prune_empty_groups(&mut self) {
        loop {
            let empty: Vec<String> = self
                .groups
                .iter()
                .filter(|g| g.children.is_empty())
                .map(|g| g.id.clone())
                .collect();
            if empty.is_empty() {
                break;
            }
            self.groups.retain(|g| !g.children.is_empty());
            for group in &mut self.groups {
                group.children.retain(|c| !empty.contains(c));
            }
        }
        self.group_index = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.id.clone(), i))
            .collect();
    }

    fn add_expected_nodes(&mut self) {
        let builder = self.builder;
        for label in &builder.expected_nodes {
            if self.nodes.iter().any(|n| &n.label == label) {
                continue;
            }
            let peer = Peer::from_scope_label(self.scope_def.id, label);
            if self.node_index.contains_key(&scoped_id(self.scope_def.id, &peer)) {
                continue;
            }
            self.add_peer(&peer, true);
        }
    }

    fn decorate_edges(&mut self) {
        let highlighted = self.builder.highlighted.as_deref();
        let nodes = &self.nodes;
        let index = &self.node_index;
        let lookup = |id: &str| index.get(id).map(|&i| &nodes[i]);

        for edge in self.edges.iter_mut() {
            let ends: Vec<&NodeModel> = [edge.source.as_str(), edge.target.as_str()]
                .into_iter()
                .filter_map(lookup)
                .collect();
            edge.shadowed = ends.iter().any(|n| n.shadowed);
            edge.highlighted = !edge.shadowed
                && (highlighted == Some(edge.id.as_str()) || ends.iter().any(|n| n.highlighted));
        }
    }
}

fn node_label(node_type: NodeType, peer: &Peer) -> String {
    let scope = match node_type {
        NodeType::Cluster => ScopeId::Cluster,
        NodeType::Zone => ScopeId::Zone,
        NodeType::Host => ScopeId::Host,
        NodeType::Namespace => ScopeId::Namespace,
        NodeType::Owner => ScopeId::Owner,
        NodeType::Resource => ScopeId::Resource,
        NodeType::Unknown => return UNKNOWN_LABEL.to_string(),
    };
    peer.field(scope).unwrap_or(UNKNOWN_LABEL).to_string()
}
