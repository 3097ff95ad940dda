//! Flow topology CLI
//!
//! Builds topology models and network health reports offline, from JSON
//! exports of flow metrics, alerting rules and silences.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{filters, health, topology};
use flow_lib::{EngineMetrics, PluginContext, StructuredLogger};

/// Flow topology CLI
#[derive(Parser)]
#[command(name = "flowctl")]
#[command(author, version, about = "CLI for network flow topology and health", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/flowctl/config.*)
    #[arg(long, env = "FLOWCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    /// Print Prometheus metrics of the run after the command output
    #[arg(long)]
    pub dump_metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a topology model from flow metrics
    Topology(topology::TopologyArgs),

    /// Compute network health from alerting and recording rules
    Health(health::HealthArgs),

    /// Add or remove the filters of a topology element
    Filter(filters::FilterArgs),
}

fn init_tracing(verbose: bool, format: output::OutputFormat) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        output::OutputFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        output::OutputFormat::Table => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.format);

    if let Err(e) = run(cli) {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = config::CliConfig::load(cli.config.as_deref())?;
    let ctx = PluginContext::new(cfg.plugin).context("Invalid plugin configuration")?;

    let metrics = EngineMetrics::new();
    let logger = StructuredLogger::new("flowctl");
    logger.log_startup(env!("CARGO_PKG_VERSION"), ctx.generation());

    match &cli.command {
        Commands::Topology(args) => {
            topology::run(&ctx, &cfg.topology, args, cli.format, &metrics, &logger)?;
        }
        Commands::Health(args) => {
            health::run(&ctx, args, cli.format, &metrics, &logger)?;
        }
        Commands::Filter(args) => {
            filters::run(&ctx, args, cli.format)?;
        }
    }

    if cli.dump_metrics {
        print!("{}", metrics.gather_text());
    }

    Ok(())
}
