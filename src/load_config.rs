/// `load_config` module: Loads a static YAML config into the CLI config and the core
/// [`SynchroniseConfig`].
///
/// This module is the only place where the user-supplied YAML is parsed and mapped to
/// strongly-typed structs. Secrets never live in the file: the HTTP store token is read
/// from the environment by [`crate::store::HttpStore::new_from_env`].
///
/// # Accepted schema
/// ```yaml
/// origin:
///   base_url: http://ddebs.ubuntu.com
///   release: trusty
///   component: main
///   arch: i386
///   index: packages        # or: sources
///   compression: none      # or: gzip
/// target:
///   base_path: /public/ubuntu
///   concurrency: 1
/// store:
///   type: fs               # or: http, with base_url
///   root: ./mirror
/// ```
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use deb_mirror_core::config::{OriginConfig, SynchroniseConfig, TargetConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    pub origin: OriginConfig,
    pub target: TargetConfig,
    pub store: StoreSection,
}

/// Which target store client to construct.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreSection {
    /// A local directory.
    Fs { root: PathBuf },
    /// A remote store reached over HTTP.
    Http { base_url: String },
}

impl CliConfig {
    pub fn synchronise_config(&self) -> SynchroniseConfig {
        SynchroniseConfig {
            origin: self.origin.clone(),
            target: self.target.clone(),
        }
    }
}

/// Loads a static YAML config file (no secrets) and validates it.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Err(e) = config.synchronise_config().validate() {
        error!(error = %e, config_path = ?path_ref, "Config failed validation");
        return Err(anyhow::anyhow!("Invalid config {:?}: {e}", path_ref));
    }

    info!(
        base_url = %config.origin.base_url,
        store = ?config.store,
        "Config loaded successfully"
    );
    Ok(config)
}
