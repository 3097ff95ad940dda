//! Topology metric records and statistics
//!
//! A metric record pairs two peers with a bag of statistics computed over the
//! query window. Values are read through [`get_stat`], which never returns NaN.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::peer::{NameAndType, Peer, PeerFields};
use crate::error::{FlowError, Result};

/// Aggregate function selectable on a statistics bag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFunction {
    Last,
    Avg,
    Min,
    Max,
    Sum,
    Rate,
    P50,
    P90,
    P99,
    Count,
}

impl MetricFunction {
    pub const ALL: [MetricFunction; 10] = [
        MetricFunction::Last,
        MetricFunction::Avg,
        MetricFunction::Min,
        MetricFunction::Max,
        MetricFunction::Sum,
        MetricFunction::Rate,
        MetricFunction::P50,
        MetricFunction::P90,
        MetricFunction::P99,
        MetricFunction::Count,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricFunction::Last => "last",
            MetricFunction::Avg => "avg",
            MetricFunction::Min => "min",
            MetricFunction::Max => "max",
            MetricFunction::Sum => "sum",
            MetricFunction::Rate => "rate",
            MetricFunction::P50 => "p50",
            MetricFunction::P90 => "p90",
            MetricFunction::P99 => "p99",
            MetricFunction::Count => "count",
        }
    }
}

impl fmt::Display for MetricFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricFunction {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        MetricFunction::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| FlowError::UnknownMetricFunction(s.to_string()))
    }
}

/// What the metric values measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    Bytes,
    Packets,
    PktDropBytes,
    PktDropPackets,
    DnsLatencyMs,
    TimeFlowRttNs,
    Flows,
}

impl MetricType {
    pub const ALL: [MetricType; 7] = [
        MetricType::Bytes,
        MetricType::Packets,
        MetricType::PktDropBytes,
        MetricType::PktDropPackets,
        MetricType::DnsLatencyMs,
        MetricType::TimeFlowRttNs,
        MetricType::Flows,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Bytes => "Bytes",
            MetricType::Packets => "Packets",
            MetricType::PktDropBytes => "PktDropBytes",
            MetricType::PktDropPackets => "PktDropPackets",
            MetricType::DnsLatencyMs => "DnsLatencyMs",
            MetricType::TimeFlowRttNs => "TimeFlowRttNs",
            MetricType::Flows => "Flows",
        }
    }

    /// Volume metrics are per-second rates unless summed over the window
    pub fn is_volume(&self) -> bool {
        matches!(
            self,
            MetricType::Bytes
                | MetricType::Packets
                | MetricType::PktDropBytes
                | MetricType::PktDropPackets
        )
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        MetricType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| FlowError::UnknownMetricType(s.to_string()))
    }
}

/// Statistics keyed by aggregate function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsBag(BTreeMap<MetricFunction, f64>);

impl StatsBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, function: MetricFunction, value: f64) -> Self {
        self.0.insert(function, value);
        self
    }

    pub fn insert(&mut self, function: MetricFunction, value: f64) {
        self.0.insert(function, value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compute every function from `(timestamp, value)` datapoints.
    ///
    /// Rates are averaged; `sum` is the average rate over `range_secs`, or
    /// the plain sum of values when no range is given.
    pub fn from_series(points: &[(f64, f64)], range_secs: f64) -> Self {
        let mut values: Vec<f64> = points
            .iter()
            .map(|(_, v)| *v)
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return Self::default().with(MetricFunction::Count, 0.0);
        }

        let last = values[values.len() - 1];
        let count = values.len() as f64;
        let total: f64 = values.iter().sum();
        let avg = total / count;
        let sum = if range_secs > 0.0 {
            avg * range_secs
        } else {
            total
        };

        values.sort_by(|a, b| a.total_cmp(b));

        Self::default()
            .with(MetricFunction::Last, last)
            .with(MetricFunction::Avg, avg)
            .with(MetricFunction::Min, values[0])
            .with(MetricFunction::Max, values[values.len() - 1])
            .with(MetricFunction::Sum, sum)
            .with(MetricFunction::Rate, avg)
            .with(MetricFunction::P50, percentile(&values, 50.0))
            .with(MetricFunction::P90, percentile(&values, 90.0))
            .with(MetricFunction::P99, percentile(&values, 99.0))
            .with(MetricFunction::Count, count)
    }
}

/// Nearest-rank percentile over sorted values
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// Value of `function` in the bag; 0 when absent or not finite
pub fn get_stat(stats: &StatsBag, function: MetricFunction) -> f64 {
    match stats.0.get(&function) {
        Some(v) if v.is_finite() => *v,
        _ => 0.0,
    }
}

/// Traffic between two peers over the query window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyMetrics {
    pub source: Peer,
    pub destination: Peer,
    pub stats: StatsBag,
}

/// Largest value of `function` across records
pub fn max_stat(metrics: &[TopologyMetrics], function: MetricFunction) -> f64 {
    metrics
        .iter()
        .map(|m| get_stat(&m.stats, function))
        .fold(0.0, f64::max)
}

/// One series of a Prometheus matrix result
#[derive(Debug, Clone, Deserialize)]
pub struct RawTopologyMetric {
    pub metric: HashMap<String, String>,
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

fn label(labels: &HashMap<String, String>, key: &str) -> Option<String> {
    labels.get(key).filter(|v| !v.is_empty()).cloned()
}

fn peer_from_labels(labels: &HashMap<String, String>, prefix: &str) -> Peer {
    let name_and_type = |name_key: &str, type_key: &str| {
        label(labels, &format!("{prefix}{name_key}")).map(|name| {
            NameAndType::new(
                name,
                label(labels, &format!("{prefix}{type_key}")).unwrap_or_default(),
            )
        })
    };

    PeerFields {
        cluster: label(labels, "K8S_ClusterName"),
        zone: label(labels, &format!("{prefix}K8S_Zone")),
        host_name: label(labels, &format!("{prefix}K8S_HostName")),
        namespace: label(labels, &format!("{prefix}K8S_Namespace")),
        owner: name_and_type("K8S_OwnerName", "K8S_OwnerType"),
        resource: name_and_type("K8S_Name", "K8S_Type"),
        addr: label(labels, &format!("{prefix}Addr")),
    }
    .into()
}

/// Convert raw matrix results labelled with flow field names into records.
/// Non-numeric sample values are skipped.
pub fn parse_topology_metrics(raw: &[RawTopologyMetric], range_secs: f64) -> Vec<TopologyMetrics> {
    raw.iter()
        .map(|series| {
            let points: Vec<(f64, f64)> = series
                .values
                .iter()
                .filter_map(|(ts, v)| v.parse::<f64>().ok().map(|v| (*ts, v)))
                .collect();
            TopologyMetrics {
                source: peer_from_labels(&series.metric, "Src"),
                destination: peer_from_labels(&series.metric, "Dst"),
                stats: StatsBag::from_series(&points, range_secs),
            }
        })
        .collect()
}

fn scaled(value: f64) -> (f64, &'static str) {
    const PREFIXES: [&str; 5] = ["", "k", "M", "G", "T"];
    let mut v = value;
    let mut i = 0;
    while v.abs() >= 1000.0 && i < PREFIXES.len() - 1 {
        v /= 1000.0;
        i += 1;
    }
    (v, PREFIXES[i])
}

fn number(value: f64) -> String {
    if value.fract().abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        let s = format!("{value:.2}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Human readable value with the unit matching type and function
pub fn format_stat(value: f64, metric_type: MetricType, function: MetricFunction) -> String {
    if function == MetricFunction::Count {
        return number(value);
    }
    let per_second = function != MetricFunction::Sum;
    match metric_type {
        MetricType::Bytes | MetricType::PktDropBytes => {
            let (v, prefix) = scaled(value);
            let unit = if per_second { "Bps" } else { "B" };
            format!("{} {prefix}{unit}", number(v))
        }
        MetricType::Packets | MetricType::PktDropPackets => {
            let (v, prefix) = scaled(value);
            let unit = if per_second { "pps" } else { "pkts" };
            format!("{} {prefix}{unit}", number(v))
        }
        MetricType::DnsLatencyMs => format!("{} ms", number(value)),
        MetricType::TimeFlowRttNs => format!("{} ms", number(value / 1_000_000.0)),
        MetricType::Flows => {
            let unit = if per_second { "flows/s" } else { "flows" };
            format!("{} {unit}", number(value))
        }
    }
}
