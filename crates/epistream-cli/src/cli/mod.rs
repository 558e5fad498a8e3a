//! CLI for the epistream server.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use epistream_core::catalog::SqliteCatalog;
use epistream_core::config;
use std::path::PathBuf;

use commands::{run_cleanup, run_import, run_serve, run_status};

/// Top-level CLI for epistream.
#[derive(Debug, Parser)]
#[command(name = "epistream")]
#[command(about = "epistream: fetch, progressively stream and relay media objects", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the HTTP server and the fetch/relay pipeline.
    Serve {
        /// Address to bind (overrides `listen_addr` from the config).
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
        /// Number of fetch workers (overrides `fetch_workers`).
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },

    /// Import a `video.json` catalog file.
    Import {
        /// Path to the JSON file.
        path: PathBuf,
    },

    /// Show catalog counts and local artifact usage.
    Status,

    /// Delete local artifacts whose objects are already uploaded.
    Cleanup {
        /// Also delete artifacts younger than the relay grace period.
        #[arg(long)]
        all: bool,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let catalog = SqliteCatalog::open_default().await?;

        match cli.command {
            CliCommand::Serve { listen, workers } => run_serve(cfg, catalog, listen, workers).await?,
            CliCommand::Import { path } => run_import(&catalog, &path).await?,
            CliCommand::Status => run_status(&cfg, &catalog).await?,
            CliCommand::Cleanup { all } => run_cleanup(&cfg, &catalog, all).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
