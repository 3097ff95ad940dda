//! Subcommand implementations and shared input helpers

pub mod filters;
pub mod health;
pub mod topology;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

use flow_lib::health::{RecordingRule, Rule, Silence};
use flow_lib::model::{parse_topology_metrics, RawTopologyMetric, TopologyMetrics};

/// Read and parse a JSON input file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Flow metrics, either as parsed records or as a Prometheus matrix
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetricsFile {
    Records(Vec<TopologyMetrics>),
    Matrix(Vec<RawTopologyMetric>),
}

/// Load flow records; matrix series are reduced over `range_secs`
pub fn read_metrics(path: &Path, range_secs: f64) -> Result<Vec<TopologyMetrics>> {
    Ok(match read_json::<MetricsFile>(path)? {
        MetricsFile::Records(records) => records,
        MetricsFile::Matrix(series) => parse_topology_metrics(&series, range_secs),
    })
}

/// Inputs of the health engine
#[derive(Debug, Default)]
pub struct HealthInputs {
    pub rules: Vec<Rule>,
    pub recording: Vec<RecordingRule>,
    pub silences: Vec<Silence>,
}

impl HealthInputs {
    pub fn load(rules: &Path, recording: Option<&Path>, silences: Option<&Path>) -> Result<Self> {
        Ok(Self {
            rules: read_json(rules)?,
            recording: recording.map(read_json).transpose()?.unwrap_or_default(),
            silences: silences.map(read_json).transpose()?.unwrap_or_default(),
        })
    }
}
