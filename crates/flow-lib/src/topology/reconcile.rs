//! Reconciliation of a freshly built model with the previous one

use std::collections::HashMap;

use super::elements::{GroupModel, HealthDecoration, NodeModel, NodeType, TopologyModel};
use crate::health::{HealthLevel, HealthStat, HealthStats};

/// Carry user-driven state over from `previous`: node positions and pins,
/// group positions and collapsed flags. Elements are matched by id; those
/// missing from `fresh` are forgotten.
pub fn merge_forward(previous: &TopologyModel, fresh: TopologyModel) -> TopologyModel {
    let old_nodes: HashMap<&str, &NodeModel> =
        previous.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let old_groups: HashMap<&str, &GroupModel> =
        previous.groups.iter().map(|g| (g.id.as_str(), g)).collect();

    let nodes = fresh
        .nodes
        .into_iter()
        .map(|mut node| {
            if let Some(old) = old_nodes.get(node.id.as_str()) {
                node.position = old.position;
                node.pinned = old.pinned;
            }
            node
        })
        .collect();
    let groups = fresh
        .groups
        .into_iter()
        .map(|mut group| {
            if let Some(old) = old_groups.get(group.id.as_str()) {
                group.position = old.position;
                group.collapsed = old.collapsed;
            }
            group
        })
        .collect();

    TopologyModel {
        nodes,
        groups,
        ..fresh
    }
}

fn health_of<'s>(node: &NodeModel, stats: &'s HealthStats) -> Option<&'s HealthStat> {
    let peer = &node.peer;
    match node.node_type {
        NodeType::Namespace => stats.namespace(peer.namespace.as_deref()?),
        NodeType::Host => stats.node(peer.host_name.as_deref()?),
        NodeType::Resource if peer.resource_kind() == Some("Node") => {
            stats.node(&peer.resource.as_ref()?.name)
        }
        NodeType::Owner => {
            let owner = peer.owner.as_ref()?;
            stats.owner(peer.namespace.as_deref()?, &owner.name)
        }
        _ => None,
    }
}

/// Attach the score of the matching resource to namespace, host and owner
/// nodes
pub fn apply_health(model: TopologyModel, stats: &HealthStats) -> TopologyModel {
    let nodes = model
        .nodes
        .into_iter()
        .map(|mut node| {
            node.health = health_of(&node, stats).map(|stat| HealthDecoration {
                score: stat.score,
                level: HealthLevel::from_score(stat.score),
            });
            node
        })
        .collect();
    TopologyModel { nodes, ..model }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PluginContext, ScopeId};
    use crate::model::metrics::{MetricFunction, StatsBag, TopologyMetrics};
    use crate::model::peer::{Peer, PeerFields};
    use crate::topology::elements::Position;
    use crate::topology::options::TopologyOptions;
    use crate::topology::TopologyModelBuilder;

    fn namespace(name: &str) -> Peer {
        PeerFields {
            namespace: Some(name.to_string()),
            ..Default::default()
        }
        .into()
    }

    fn build(options: &TopologyOptions) -> TopologyModel {
        let ctx = PluginContext::default();
        let metrics = vec![TopologyMetrics {
            source: namespace("ns1"),
            destination: namespace("ns2"),
            stats: StatsBag::new().with(MetricFunction::Sum, 10.0),
        }];
        TopologyModelBuilder::new(&ctx, options, ScopeId::Namespace).build(&metrics, &[])
    }

    #[test]
    fn test_merge_forward_keeps_user_state() {
        let options = TopologyOptions::default();
        let mut previous = build(&options);
        previous.nodes[0].pinned = true;
        previous.nodes[0].position = Some(Position { x: 3.0, y: 4.0 });

        let merged = merge_forward(&previous, build(&options));
        assert!(merged.nodes[0].pinned);
        assert_eq!(merged.nodes[0].position, Some(Position { x: 3.0, y: 4.0 }));
        assert!(!merged.nodes[1].pinned);
        assert_eq!(merged.edges, previous.edges);
    }

    #[test]
    fn test_merge_forward_group_state() {
        let options = TopologyOptions {
            group_types: "clusters".parse().unwrap(),
            ..Default::default()
        };
        let ctx = PluginContext::default();
        let peer = |ns: &str| -> Peer {
            PeerFields {
                cluster: Some("c1".to_string()),
                namespace: Some(ns.to_string()),
                ..Default::default()
            }
            .into()
        };
        let metrics = vec![TopologyMetrics {
            source: peer("ns1"),
            destination: peer("ns2"),
            stats: StatsBag::new().with(MetricFunction::Sum, 10.0),
        }];
        let builder = TopologyModelBuilder::new(&ctx, &options, ScopeId::Namespace);
        let mut previous = builder.build(&metrics, &[]);
        assert_eq!(previous.groups.len(), 1);
        previous.groups[0].collapsed = true;

        let merged = merge_forward(&previous, builder.build(&metrics, &[]));
        assert!(merged.groups[0].collapsed);
    }

    #[test]
    fn test_apply_health_on_namespaces() {
        let model = build(&TopologyOptions::default());
        let mut stat = HealthStat::new("ns1", None, None);
        stat.score = 4.2;
        let stats = HealthStats {
            global: HealthStat::new("global", None, None),
            by_namespace: vec![stat],
            by_node: Vec::new(),
            by_owner: Vec::new(),
        };

        let decorated = apply_health(model, &stats);
        let ns1 = decorated.node("n=ns1").unwrap();
        assert_eq!(
            ns1.health,
            Some(HealthDecoration {
                score: 4.2,
                level: HealthLevel::Critical
            })
        );
        assert!(decorated.node("n=ns2").unwrap().health.is_none());
    }
}
