//! Topology graph generation
//!
//! This module turns peer-to-peer traffic records into a graph of nodes,
//! nested groups and merged edges for the active scope, and reconciles
//! successive models so that user-driven layout state survives refreshes.

mod builder;
mod decorate;
mod elements;
mod options;
mod reconcile;


pub use builder::{generate_data_model, TopologyModelBuilder, UNKNOWN_LABEL};
pub use decorate::{animation_speed, edge_style, edge_tag, tag_function, tag_status};
pub use elements::{
    AnimationSpeed, Badge, BadgeSource, Diagnostic, DiagnosticLevel, EdgeModel, EdgeStyle,
    GroupModel, HealthDecoration, KubernetesBadges, NodeBadge, NodeData, NodeModel, NodeShape,
    NodeType, Position, TagStatus, Terminal, TopologyModel,
};
pub use options::{GroupTypes, TopologyOptions, TruncateLength};
pub use reconcile::{apply_health, merge_forward};
