//! Configuration management for the CLI
//!
//! Settings are layered: built-in defaults, then an optional config file,
//! then `FLOWCTL__*` environment variables (`FLOWCTL__TOPOLOGY__EDGES=false`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use flow_lib::{PluginConfig, TopologyOptions};

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Scope and filter definitions handed to the engines
    pub plugin: PluginConfig,
    /// Default topology display options
    pub topology: TopologyOptions,
}

impl CliConfig {
    /// Load configuration from `path`, or from the default location when
    /// no path is given. Only an explicit path is required to exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => match Self::config_path() {
                Some(default) => config::File::from(default).required(false),
                None => return Self::from_env_only(),
            },
        };

        config::Config::builder()
            .add_source(file)
            .add_source(Self::environment())
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    fn from_env_only() -> Result<Self> {
        config::Config::builder()
            .add_source(Self::environment())
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("FLOWCTL").separator("__")
    }

    /// Default configuration file, without extension
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("flowctl").join("config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"topology": {{"edges": false, "group_types": "namespaces"}}, "plugin": {{"traffic_page_path": "/traffic"}}}}"#
        )
        .unwrap();

        let cfg = CliConfig::load(Some(file.path())).unwrap();
        assert!(!cfg.topology.edges);
        assert_eq!(cfg.topology.group_types.to_string(), "namespaces");
        assert!(cfg.topology.node_badges);
        assert_eq!(cfg.plugin.traffic_page_path, "/traffic");
        assert!(!cfg.plugin.scopes.is_empty());
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(CliConfig::load(Some(&missing)).is_err());
    }
}
