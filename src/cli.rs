///
/// This module implements the CLI interface for deb-mirror: command parsing, config
/// overrides and wiring the concrete origin and store clients into the core pipeline.
///
/// All parsing, checking and transfer logic lives in the [`deb-mirror-core`] crate.
/// This module is strictly CLI glue.
///
/// ## How To Use
/// - For command-line users: `deb-mirror sync --config mirror.yaml`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`]; it returns
///   the run's [`RunStatus`], whose [`RunStatus::code`] is the process exit status.
///
/// [`deb-mirror-core`]: ../../deb-mirror-core/
use crate::load_config::{load_config, StoreSection};
use crate::store::HttpStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deb_mirror_core::origin::HttpOrigin;
use deb_mirror_core::store::FsStore;
use deb_mirror_core::synchronise::{synchronise, RunStatus};
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for deb-mirror: mirror a package repository into an object store.
#[derive(Parser)]
#[clap(
    name = "deb-mirror",
    version,
    about = "Mirror a Debian-style repository index and its artifacts into an object store"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise the configured index and every missing or stale artifact
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Override target.concurrency from the config file
        #[clap(long)]
        concurrency: Option<usize>,
        /// Check the store but transfer nothing
        #[clap(long)]
        dry_run: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<RunStatus> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            concurrency,
            dry_run,
        } => {
            let cli_config = load_config(&config)?;
            let mut sync_config = cli_config.synchronise_config();
            if let Some(concurrency) = concurrency {
                sync_config.target.concurrency = concurrency;
            }
            sync_config.target.dry_run |= dry_run;
            sync_config
                .validate()
                .with_context(|| format!("Invalid overrides for {}", config.display()))?;
            sync_config.trace_loaded();
            tracing::info!(command = "sync", "Starting synchronisation process");

            let origin = Arc::new(
                HttpOrigin::new(&sync_config.origin.base_url)
                    .context("Failed to construct origin client")?,
            );
            let result = match &cli_config.store {
                StoreSection::Fs { root } => {
                    let store = Arc::new(FsStore::new(root));
                    synchronise(&sync_config, origin, store).await
                }
                StoreSection::Http { base_url } => {
                    let store = Arc::new(
                        HttpStore::new_from_env(base_url)
                            .context("Failed to construct store client")?,
                    );
                    synchronise(&sync_config, origin, store).await
                }
            };

            match result {
                Ok(report) => {
                    let status = report.status();
                    tracing::info!(command = "sync", ?status, "Synchronisation complete");
                    println!("Synchronise complete.\nReport:");
                    println!("{:#?}", report);
                    Ok(status)
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
