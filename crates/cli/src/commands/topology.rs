//! Topology model generation

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Instant;
use tabled::Tabled;
use tracing::debug;

use flow_lib::health::{build_stats, items_from_recording, items_from_rules};
use flow_lib::model::{max_stat, Filter, MetricFunction, MetricType};
use flow_lib::topology::{apply_health, merge_forward, GroupTypes, TopologyModelBuilder};
use flow_lib::{EngineMetrics, PluginContext, ScopeId, StructuredLogger, TopologyModel, TopologyOptions};

use super::{read_json, read_metrics, HealthInputs};
use crate::output::{self, or_dash, OutputFormat};

/// Arguments of `flowctl topology`
#[derive(Debug, Clone, clap::Args)]
pub struct TopologyArgs {
    /// Flow metrics (records or Prometheus matrix JSON)
    #[arg(long)]
    pub metrics: PathBuf,

    /// Dropped packet metrics, same format as --metrics
    #[arg(long)]
    pub dropped: Option<PathBuf>,

    /// Aggregation scope (cluster, zone, host, namespace, owner, resource)
    #[arg(long, default_value = "namespace")]
    pub scope: ScopeId,

    /// Grouping, e.g. "clusters+namespaces", "auto" or "none"
    #[arg(long)]
    pub group: Option<GroupTypes>,

    /// Metric function shown on edges
    #[arg(long)]
    pub function: Option<MetricFunction>,

    /// Metric type shown on edges
    #[arg(long)]
    pub metric_type: Option<MetricType>,

    /// Search text; matching nodes are filtered, others shadowed
    #[arg(long, default_value = "")]
    pub search: String,

    /// Id of the highlighted node or edge
    #[arg(long)]
    pub highlight: Option<String>,

    /// Active filters (JSON list)
    #[arg(long)]
    pub filters: Option<PathBuf>,

    /// Labels of nodes to show even without traffic
    #[arg(long, value_delimiter = ',')]
    pub expected: Vec<String>,

    /// Previous model whose layout state is carried over
    #[arg(long)]
    pub previous: Option<PathBuf>,

    /// Alerting rules used to decorate nodes with health
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Recording rules used with --rules
    #[arg(long, requires = "rules")]
    pub recording: Option<PathBuf>,

    /// Query window of matrix metrics, in seconds
    #[arg(long, default_value_t = 300.0)]
    pub range: f64,

    /// Use dark theme badge colors
    #[arg(long)]
    pub dark: bool,
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    node_type: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Health")]
    health: String,
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    group_type: String,
    #[tabled(rename = "Parent")]
    parent: String,
    #[tabled(rename = "Children")]
    children: usize,
}

#[derive(Tabled)]
struct EdgeRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Traffic")]
    tag: String,
    #[tabled(rename = "Dropped")]
    dropped: String,
    #[tabled(rename = "Bidirectional")]
    bidirectional: String,
}

/// Apply command line overrides to the configured options
fn resolve_options(defaults: &TopologyOptions, args: &TopologyArgs) -> TopologyOptions {
    let mut options = defaults.clone();
    if let Some(group) = &args.group {
        options.group_types = group.clone();
    }
    if let Some(function) = args.function {
        options.metric_function = function;
    }
    if let Some(metric_type) = args.metric_type {
        options.metric_type = metric_type;
    }
    options
}

fn node_state(node: &flow_lib::topology::NodeModel) -> String {
    let mut flags = Vec::new();
    if node.filtered {
        flags.push("filtered");
    }
    if node.shadowed {
        flags.push("shadowed");
    }
    if node.highlighted {
        flags.push("highlighted");
    }
    if node.no_metrics {
        flags.push("expected");
    }
    if flags.is_empty() {
        "-".to_string()
    } else {
        flags.join(",")
    }
}

/// Build the topology model for the given inputs
pub fn build_model(
    ctx: &PluginContext,
    defaults: &TopologyOptions,
    args: &TopologyArgs,
    metrics: &EngineMetrics,
    logger: &StructuredLogger,
) -> Result<TopologyModel> {
    let records = read_metrics(&args.metrics, args.range)?;
    let dropped = match &args.dropped {
        Some(path) => read_metrics(path, args.range)?,
        None => Vec::new(),
    };
    let filters: Vec<Filter> = match &args.filters {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let mut options = resolve_options(defaults, args);
    options.max_edge_stat = max_stat(&records, options.metric_function);
    debug!(
        event = "topology_inputs",
        records = records.len(),
        dropped = dropped.len(),
        filters = filters.len(),
        max_edge_stat = options.max_edge_stat,
        "Topology inputs loaded"
    );

    let start = Instant::now();
    let mut model = TopologyModelBuilder::new(ctx, &options, args.scope)
        .search(args.search.as_str())
        .highlighted(args.highlight.clone())
        .filters(&filters)
        .expected_nodes(args.expected.clone())
        .dark_mode(args.dark)
        .build(&records, &dropped);
    let elapsed = start.elapsed().as_secs_f64();

    metrics.record_topology(args.scope.as_str(), &model, elapsed);
    logger.log_model_built(args.scope.as_str(), &model, elapsed);
    for diagnostic in &model.diagnostics {
        logger.log_diagnostic(diagnostic);
    }

    if let Some(path) = &args.previous {
        let previous: TopologyModel =
            read_json(path).context("Failed to load previous model")?;
        model = merge_forward(&previous, model);
    }

    if let Some(rules) = &args.rules {
        let inputs = HealthInputs::load(rules, args.recording.as_deref(), None)?;
        let mut items = items_from_rules(&inputs.rules, &inputs.silences, ctx);
        items.extend(items_from_recording(&inputs.recording, ctx));
        let start = Instant::now();
        let stats = build_stats(&items, ctx);
        let elapsed = start.elapsed().as_secs_f64();
        metrics.record_health(&stats, elapsed);
        logger.log_health_stats(&stats, elapsed);
        model = apply_health(model, &stats);
    }

    Ok(model)
}

/// Run `flowctl topology`
pub fn run(
    ctx: &PluginContext,
    defaults: &TopologyOptions,
    args: &TopologyArgs,
    format: OutputFormat,
    metrics: &EngineMetrics,
    logger: &StructuredLogger,
) -> Result<()> {
    let model = build_model(ctx, defaults, args, metrics, logger)?;

    match format {
        OutputFormat::Json => output::print_json(&model)?,
        OutputFormat::Table => print_model(&model),
    }
    Ok(())
}

fn print_model(model: &TopologyModel) {
    let nodes: Vec<NodeRow> = model
        .nodes
        .iter()
        .map(|n| NodeRow {
            id: n.id.clone(),
            node_type: format!("{:?}", n.node_type).to_lowercase(),
            label: match &n.secondary_label {
                Some(secondary) => format!("{} ({})", n.display_label, secondary),
                None => n.display_label.clone(),
            },
            group: or_dash(n.parent.as_deref()),
            state: node_state(n),
            health: n
                .health
                .map(|h| output::color_score(h.score))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    output::print_table("Nodes", &nodes);

    if !model.groups.is_empty() {
        let groups: Vec<GroupRow> = model
            .groups
            .iter()
            .map(|g| GroupRow {
                id: g.id.clone(),
                group_type: g.group_type.to_string(),
                parent: or_dash(g.parent.as_deref()),
                children: g.children.len(),
            })
            .collect();
        output::print_table("Groups", &groups);
    }

    let edges: Vec<EdgeRow> = model
        .edges
        .iter()
        .map(|e| EdgeRow {
            source: e.source.clone(),
            target: e.target.clone(),
            tag: or_dash(e.tag.as_deref()),
            dropped: if e.dropped_stat > 0.0 {
                format!("{}", e.dropped_stat)
            } else {
                "-".to_string()
            },
            bidirectional: if e.is_bidirectional() { "yes" } else { "no" }.to_string(),
        })
        .collect();
    output::print_table("Edges", &edges);

    for diagnostic in &model.diagnostics {
        output::print_warning(&format!("{:?}: {}", diagnostic.level, diagnostic.message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: TopologyArgs,
    }

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let harness = Harness::parse_from([
            "topology",
            "--metrics",
            "m.json",
            "--group",
            "namespaces+clusters",
            "--function",
            "max",
        ]);
        let defaults = TopologyOptions {
            edges: false,
            ..TopologyOptions::default()
        };
        let options = resolve_options(&defaults, &harness.args);
        assert!(!options.edges);
        assert_eq!(options.group_types.to_string(), "clusters+namespaces");
        assert_eq!(options.metric_function, MetricFunction::Max);
        assert_eq!(options.metric_type, MetricType::Bytes);
    }

    #[test]
    fn test_expected_is_comma_separated() {
        let harness =
            Harness::parse_from(["topology", "--metrics", "m.json", "--expected", "a,b"]);
        assert_eq!(harness.args.expected, vec!["a", "b"]);
        assert_eq!(harness.args.scope, ScopeId::Namespace);
    }
}
