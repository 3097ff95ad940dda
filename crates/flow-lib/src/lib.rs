//! Network flow topology and health library
//!
//! This crate provides the core functionality for:
//! - Peer identity and metric aggregation for flow records
//! - Topology model generation (nodes, groups, merged edges)
//! - Flow filter matching and toggling
//! - Network health scoring from alerting and recording rules
//! - Observability for both engines

pub mod context;
pub mod error;
pub mod health;
pub mod model;
pub mod observability;
pub mod topology;

pub use context::{PluginConfig, PluginContext, ScopeConfigDef, ScopeId};
pub use error::{FlowError, Result};
pub use health::{build_stats, HealthLevel, HealthStats};
pub use model::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use topology::{
    apply_health, generate_data_model, merge_forward, TopologyModel, TopologyModelBuilder,
    TopologyOptions,
};
