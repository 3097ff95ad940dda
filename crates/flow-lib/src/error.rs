//! Error types for the flow library

use thiserror::Error;

use crate::context::ScopeId;

/// Errors surfaced by the flow library
///
/// Invariant violations found while generating a topology model are not
/// errors: they are reported as [`crate::topology::Diagnostic`] entries next
/// to the model instead.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("no filter definition found for `{0}`")]
    UnknownFilterDefinition(String),

    #[error("element has no filterable field in scope `{0}`")]
    NoFilterableField(ScopeId),

    #[error("invalid group types `{0}`")]
    InvalidGroupTypes(String),

    #[error("unknown scope `{0}`")]
    UnknownScope(String),

    #[error("unknown metric function `{0}`")]
    UnknownMetricFunction(String),

    #[error("unknown metric type `{0}`")]
    UnknownMetricType(String),

    #[error("invalid plugin configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
