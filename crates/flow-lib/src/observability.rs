//! Observability for the topology and health engines
//!
//! Provides:
//! - Prometheus metrics (build latency, model size, health scores, diagnostics)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge, register_gauge_vec, register_histogram_vec, register_int_counter_vec,
    register_int_gauge_vec, Encoder, Gauge, GaugeVec, HistogramVec, IntCounterVec, IntGaugeVec,
    TextEncoder,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::health::{HealthLevel, HealthStats};
use crate::topology::{Diagnostic, DiagnosticLevel, TopologyModel};

/// Default histogram buckets for build latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    build_latency_seconds: HistogramVec,
    topology_elements: IntGaugeVec,
    health_resources: IntGaugeVec,
    health_score: Gauge,
    health_level_info: GaugeVec,
    diagnostics: IntCounterVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            build_latency_seconds: register_histogram_vec!(
                "flow_engine_build_latency_seconds",
                "Time spent building a topology model or health stats",
                &["engine"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register build_latency_seconds"),

            topology_elements: register_int_gauge_vec!(
                "flow_engine_topology_elements",
                "Elements in the last topology model, by scope and element type",
                &["scope", "element"]
            )
            .expect("Failed to register topology_elements"),

            health_resources: register_int_gauge_vec!(
                "flow_engine_health_resources",
                "Resources with an active health signal, by kind",
                &["kind"]
            )
            .expect("Failed to register health_resources"),

            health_score: register_gauge!(
                "flow_engine_health_score",
                "Last computed global health score"
            )
            .expect("Failed to register health_score"),

            health_level_info: register_gauge_vec!(
                "flow_engine_health_level_info",
                "Level of the last computed global health score",
                &["level"]
            )
            .expect("Failed to register health_level_info"),

            diagnostics: register_int_counter_vec!(
                "flow_engine_diagnostics_total",
                "Non-fatal problems met while building topology models",
                &["level"]
            )
            .expect("Failed to register diagnostics"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    /// Record a finished topology build
    pub fn record_topology(&self, scope: &str, model: &TopologyModel, duration_secs: f64) {
        let inner = self.inner();
        inner
            .build_latency_seconds
            .with_label_values(&["topology"])
            .observe(duration_secs);
        for (element, count) in [
            ("nodes", model.nodes.len()),
            ("groups", model.groups.len()),
            ("edges", model.edges.len()),
        ] {
            inner
                .topology_elements
                .with_label_values(&[scope, element])
                .set(count as i64);
        }
        for diagnostic in &model.diagnostics {
            let level = match diagnostic.level {
                DiagnosticLevel::Warning => "warning",
                DiagnosticLevel::Error => "error",
            };
            inner.diagnostics.with_label_values(&[level]).inc();
        }
    }

    /// Record a finished health aggregation
    pub fn record_health(&self, stats: &HealthStats, duration_secs: f64) {
        let inner = self.inner();
        inner
            .build_latency_seconds
            .with_label_values(&["health"])
            .observe(duration_secs);
        for (kind, count) in [
            ("namespace", stats.by_namespace.len()),
            ("node", stats.by_node.len()),
            ("owner", stats.by_owner.len()),
        ] {
            inner
                .health_resources
                .with_label_values(&[kind])
                .set(count as i64);
        }
        inner.health_score.set(stats.global.score);
        inner.health_level_info.reset();
        inner
            .health_level_info
            .with_label_values(&[HealthLevel::from_score(stats.global.score).as_str()])
            .set(1.0);
    }

    /// Text exposition of every registered metric
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            warn!(event = "metrics_encode_failed", error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Structured logger for engine events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log startup
    pub fn log_startup(&self, version: &str, config_generation: u64) {
        info!(
            event = "engine_started",
            instance = %self.instance,
            version = %version,
            config_generation = config_generation,
            "Flow engine started"
        );
    }

    /// Log a generated topology model
    pub fn log_model_built(&self, scope: &str, model: &TopologyModel, duration_secs: f64) {
        info!(
            event = "topology_built",
            instance = %self.instance,
            scope = %scope,
            nodes = model.nodes.len(),
            groups = model.groups.len(),
            edges = model.edges.len(),
            diagnostics = model.diagnostics.len(),
            duration_secs = duration_secs,
            "Topology model built"
        );
    }

    /// Log a non-fatal problem reported with a model
    pub fn log_diagnostic(&self, diagnostic: &Diagnostic) {
        match diagnostic.level {
            DiagnosticLevel::Error => {
                error!(
                    event = "topology_diagnostic",
                    instance = %self.instance,
                    level = "error",
                    detail = %diagnostic.message,
                    "Topology invariant violated"
                );
            }
            DiagnosticLevel::Warning => {
                warn!(
                    event = "topology_diagnostic",
                    instance = %self.instance,
                    level = "warning",
                    detail = %diagnostic.message,
                    "Topology degraded"
                );
            }
        }
    }

    /// Log aggregated health, warning when the global score is degraded
    pub fn log_health_stats(&self, stats: &HealthStats, duration_secs: f64) {
        let level = HealthLevel::from_score(stats.global.score);
        if level.is_degraded() {
            warn!(
                event = "health_computed",
                instance = %self.instance,
                global_score = stats.global.score,
                level = %level,
                namespaces = stats.by_namespace.len(),
                nodes = stats.by_node.len(),
                owners = stats.by_owner.len(),
                duration_secs = duration_secs,
                "Network health degraded"
            );
        } else {
            info!(
                event = "health_computed",
                instance = %self.instance,
                global_score = stats.global.score,
                level = %level,
                namespaces = stats.by_namespace.len(),
                nodes = stats.by_node.len(),
                owners = stats.by_owner.len(),
                duration_secs = duration_secs,
                "Network health computed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStat;

    #[test]
    fn test_engine_metrics_record_and_gather() {
        let metrics = EngineMetrics::new();
        metrics.record_topology("namespace", &TopologyModel::default(), 0.001);
        metrics.record_health(
            &HealthStats {
                global: HealthStat::new("global", None, None),
                by_namespace: Vec::new(),
                by_node: Vec::new(),
                by_owner: Vec::new(),
            },
            0.002,
        );

        let text = metrics.gather_text();
        assert!(text.contains("flow_engine_build_latency_seconds"));
        assert!(text.contains("flow_engine_health_score 10"));
        assert!(text.contains("flow_engine_health_level_info{level=\"healthy\"} 1"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("flowctl");
        assert_eq!(logger.instance, "flowctl");
    }
}
