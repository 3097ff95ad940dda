//! Flow data model: peers, metric records and filters

pub mod filters;
pub mod metrics;
pub mod peer;

pub use filters::{
    is_dir_element_filtered, is_element_filtered, toggle_dir_element_filter,
    toggle_element_filter, Filter, FilterDefinition, FilterDir, FilterValue,
};
pub use metrics::{
    format_stat, get_stat, max_stat, parse_topology_metrics, MetricFunction, MetricType,
    RawTopologyMetric, StatsBag, TopologyMetrics,
};
pub use peer::{group_id, peer_id, NameAndType, Peer, PeerFields, UNKNOWN_PEER_ID};
