use serde::Deserialize;
use tracing::{debug, info};

use crate::error::MirrorError;
use crate::origin::{Compression, IndexKind};
use crate::parser::BoundaryStrategy;
use crate::store::join_store_path;

/// Where to mirror from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OriginConfig {
    pub base_url: String,
    pub release: String,
    pub component: String,
    /// Architecture selector; unused for Sources indices.
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub index: IndexKind,
    #[serde(default)]
    pub compression: Compression,
    /// Overrides the record boundary convention implied by `index`.
    #[serde(default)]
    pub boundary: Option<BoundaryStrategy>,
}

impl OriginConfig {
    pub fn index_path(&self) -> String {
        self.index
            .index_path(&self.release, &self.component, &self.arch, self.compression)
    }

    pub fn boundary(&self) -> BoundaryStrategy {
        self.boundary
            .clone()
            .unwrap_or_else(|| self.index.default_boundary())
    }
}

/// Where to mirror to, and how hard to push.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetConfig {
    pub base_path: String,
    /// Maximum number of concurrent transfers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Check everything, transfer nothing.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_concurrency() -> usize {
    1
}

/// The top-level synchronise configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SynchroniseConfig {
    pub origin: OriginConfig,
    pub target: TargetConfig,
}

impl SynchroniseConfig {
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.target.concurrency == 0 {
            return Err(MirrorError::Config(
                "target.concurrency must be at least 1".into(),
            ));
        }
        if self.origin.base_url.trim().is_empty() {
            return Err(MirrorError::Config("origin.base_url is empty".into()));
        }
        for (name, value) in [
            ("origin.release", &self.origin.release),
            ("origin.component", &self.origin.component),
        ] {
            if value.trim().is_empty() || value.contains('/') {
                return Err(MirrorError::Config(format!("{name} is invalid: {value:?}")));
            }
        }
        if self.origin.index == IndexKind::Packages
            && (self.origin.arch.trim().is_empty() || self.origin.arch.contains('/'))
        {
            return Err(MirrorError::Config(
                "origin.arch is required for Packages indices".into(),
            ));
        }
        Ok(())
    }

    /// Store path the raw index body is archived to.
    pub fn archive_path(&self) -> String {
        join_store_path(&self.target.base_path, &self.origin.index_path())
    }

    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.origin.base_url,
            index = %self.origin.index_path(),
            base_path = %self.target.base_path,
            concurrency = self.target.concurrency,
            dry_run = self.target.dry_run,
            "Loaded SynchroniseConfig"
        );
        debug!(?self, "SynchroniseConfig loaded (full debug)");
    }
}
