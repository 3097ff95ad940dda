//! Toggle the filters of a topology element

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use tabled::Tabled;
use tracing::info;

use flow_lib::model::{
    is_dir_element_filtered, is_element_filtered, toggle_dir_element_filter,
    toggle_element_filter, Filter, FilterDir, NameAndType, Peer, PeerFields,
};
use flow_lib::topology::NodeType;
use flow_lib::{FlowError, PluginContext, ScopeId};

use super::read_json;
use crate::output::{self, OutputFormat};

/// Side of the flow, as given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirArg {
    Src,
    Dst,
}

impl From<DirArg> for FilterDir {
    fn from(dir: DirArg) -> Self {
        match dir {
            DirArg::Src => FilterDir::Source,
            DirArg::Dst => FilterDir::Destination,
        }
    }
}

/// Arguments of `flowctl filter`
#[derive(Debug, Clone, clap::Args)]
pub struct FilterArgs {
    /// Scope of the element
    #[arg(long)]
    pub scope: ScopeId,

    /// Current filters (JSON list); empty when omitted
    #[arg(long)]
    pub filters: Option<PathBuf>,

    /// Side of the flow; omit for non-directional filters
    #[arg(long, value_enum)]
    pub dir: Option<DirArg>,

    /// Remove the element's filters instead of adding them
    #[arg(long)]
    pub remove: bool,

    #[command(flatten)]
    pub peer: PeerArgs,
}

/// Fields identifying the element
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PeerArgs {
    #[arg(long)]
    pub cluster: Option<String>,
    #[arg(long)]
    pub zone: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub namespace: Option<String>,
    #[arg(long)]
    pub owner: Option<String>,
    #[arg(long, default_value = "")]
    pub owner_type: String,
    #[arg(long)]
    pub resource: Option<String>,
    #[arg(long, default_value = "")]
    pub resource_type: String,
    #[arg(long)]
    pub addr: Option<String>,
}

impl From<&PeerArgs> for Peer {
    fn from(args: &PeerArgs) -> Self {
        PeerFields {
            cluster: args.cluster.clone(),
            zone: args.zone.clone(),
            host_name: args.host.clone(),
            namespace: args.namespace.clone(),
            owner: args
                .owner
                .as_ref()
                .map(|name| NameAndType::new(name.as_str(), args.owner_type.as_str())),
            resource: args
                .resource
                .as_ref()
                .map(|name| NameAndType::new(name.as_str(), args.resource_type.as_str())),
            addr: args.addr.clone(),
        }
        .into()
    }
}

#[derive(Tabled)]
struct FilterRow {
    #[tabled(rename = "Filter")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Values")]
    values: String,
}

/// Toggle the element's filters, returning the new filter list
pub fn toggle(ctx: &PluginContext, args: &FilterArgs, filters: &[Filter]) -> Result<Vec<Filter>> {
    let scope = ctx
        .scope(args.scope)
        .ok_or_else(|| FlowError::UnknownScope(args.scope.to_string()))?;
    let peer = Peer::from(&args.peer);
    let node_type = NodeType::classify(args.scope, &peer);

    let was_filtered = match args.dir {
        Some(dir) => is_dir_element_filtered(scope, node_type, &peer, dir.into(), filters),
        None => is_element_filtered(scope, node_type, &peer, filters),
    };
    info!(
        event = "filter_toggle",
        scope = %args.scope,
        peer = %peer.id,
        was_filtered,
        remove = args.remove,
        "Toggling element filters"
    );

    let updated = match args.dir {
        Some(dir) => toggle_dir_element_filter(
            scope,
            node_type,
            &peer,
            dir.into(),
            args.remove,
            filters,
            ctx.filter_definitions(),
        ),
        None => toggle_element_filter(
            scope,
            node_type,
            &peer,
            args.remove,
            filters,
            ctx.filter_definitions(),
        ),
    };
    updated.with_context(|| format!("Cannot toggle filters of `{}`", peer.id))
}

/// Run `flowctl filter`
pub fn run(ctx: &PluginContext, args: &FilterArgs, format: OutputFormat) -> Result<()> {
    let filters: Vec<Filter> = match &args.filters {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let updated = toggle(ctx, args, &filters)?;

    match format {
        OutputFormat::Json => output::print_json(&updated)?,
        OutputFormat::Table => {
            let rows: Vec<FilterRow> = updated
                .iter()
                .map(|f| FilterRow {
                    id: f.def.id.clone(),
                    name: f.def.name.clone(),
                    values: f
                        .values
                        .iter()
                        .map(|v| v.v.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            output::print_table("Filters", &rows);
            output::print_success(&format!(
                "{} filter(s) active",
                updated.iter().map(|f| f.values.len()).sum::<usize>()
            ));
        }
    }
    Ok(())
}
