//! Network health report

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tabled::Tabled;

use flow_lib::health::{
    build_stats, items_from_recording, items_from_rules, HealthLevel, HealthStat, HealthStats,
};
use flow_lib::{EngineMetrics, PluginContext, StructuredLogger};

use super::HealthInputs;
use crate::output::{self, or_dash, OutputFormat};

/// Arguments of `flowctl health`
#[derive(Debug, Clone, clap::Args)]
pub struct HealthArgs {
    /// Alerting rules with their alerts (JSON list)
    #[arg(long)]
    pub rules: PathBuf,

    /// Recording rules with their samples (JSON list)
    #[arg(long)]
    pub recording: Option<PathBuf>,

    /// Alertmanager silences (JSON list)
    #[arg(long)]
    pub silences: Option<PathBuf>,
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Critical")]
    critical: usize,
    #[tabled(rename = "Warning")]
    warning: usize,
    #[tabled(rename = "Other")]
    other: usize,
    #[tabled(rename = "Items")]
    items: usize,
}

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Rule")]
    rule: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

/// JSON report: stats plus the derived level of each scored resource
#[derive(Serialize)]
struct HealthReport<'a> {
    level: HealthLevel,
    stats: &'a HealthStats,
}

/// Compute health stats from the rule files
pub fn compute(
    ctx: &PluginContext,
    args: &HealthArgs,
    metrics: &EngineMetrics,
    logger: &StructuredLogger,
) -> Result<HealthStats> {
    let inputs = HealthInputs::load(
        &args.rules,
        args.recording.as_deref(),
        args.silences.as_deref(),
    )?;

    let start = Instant::now();
    let mut items = items_from_rules(&inputs.rules, &inputs.silences, ctx);
    items.extend(items_from_recording(&inputs.recording, ctx));
    let stats = build_stats(&items, ctx);
    let elapsed = start.elapsed().as_secs_f64();

    metrics.record_health(&stats, elapsed);
    logger.log_health_stats(&stats, elapsed);
    Ok(stats)
}

/// Run `flowctl health`
pub fn run(
    ctx: &PluginContext,
    args: &HealthArgs,
    format: OutputFormat,
    metrics: &EngineMetrics,
    logger: &StructuredLogger,
) -> Result<()> {
    let stats = compute(ctx, args, metrics, logger)?;

    match format {
        OutputFormat::Json => output::print_json(&HealthReport {
            level: HealthLevel::from_score(stats.global.score),
            stats: &stats,
        })?,
        OutputFormat::Table => print_stats(&stats),
    }
    Ok(())
}

fn resource_row(kind: &str, stat: &HealthStat) -> ResourceRow {
    let active = |severity: usize| stat.buckets()[severity].1.active_items().count();
    ResourceRow {
        kind: match &stat.kind {
            Some(owner_kind) => owner_kind.clone(),
            None => kind.to_string(),
        },
        name: stat.name.clone(),
        namespace: or_dash(stat.namespace.as_deref()),
        score: output::color_score(stat.score),
        level: output::color_status(HealthLevel::from_score(stat.score).as_str()),
        critical: active(0),
        warning: active(1),
        other: active(2),
        items: stat.item_count(),
    }
}

fn print_stats(stats: &HealthStats) {
    let level = HealthLevel::from_score(stats.global.score);
    let summary = format!(
        "Global score {} ({})",
        output::color_score(stats.global.score),
        output::color_status(level.as_str())
    );
    if level.is_degraded() {
        output::print_warning(&summary);
    } else {
        output::print_success(&summary);
    }

    let resources: Vec<ResourceRow> = stats
        .by_namespace
        .iter()
        .map(|s| resource_row("Namespace", s))
        .chain(stats.by_node.iter().map(|s| resource_row("Node", s)))
        .chain(stats.by_owner.iter().map(|s| resource_row("Owner", s)))
        .collect();
    output::print_table("Resources", &resources);

    let items: Vec<ItemRow> = std::iter::once(&stats.global)
        .chain(&stats.by_namespace)
        .chain(&stats.by_node)
        .chain(&stats.by_owner)
        .flat_map(|stat| {
            stat.buckets().into_iter().flat_map(move |(severity, bucket)| {
                bucket.active_items().map(move |named| ItemRow {
                    resource: match &stat.namespace {
                        Some(ns) if ns != &stat.name => format!("{}/{}", ns, stat.name),
                        _ => stat.name.clone(),
                    },
                    rule: named.item.rule_name.clone(),
                    severity: severity.as_str().to_string(),
                    state: output::color_status(named.item.state.as_str()),
                    value: format!("{}", named.item.value),
                    summary: named.item.summary.clone().unwrap_or_default(),
                })
            })
        })
        .collect();
    output::print_table("Active items", &items);

    let inactive: usize = stats
        .global
        .buckets()
        .iter()
        .map(|(_, bucket)| bucket.inactive.len())
        .sum();
    if inactive > 0 {
        output::print_info(&format!("{} rule(s) with no active alert", inactive));
    }
}
