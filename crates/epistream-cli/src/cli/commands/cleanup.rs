//! `epistream cleanup` – offline sweep of uploaded local artifacts.

use anyhow::Result;
use epistream_core::catalog::SqliteCatalog;
use epistream_core::config::EpiConfig;
use epistream_core::reaper;
use std::time::Duration;

pub async fn run_cleanup(cfg: &EpiConfig, catalog: &SqliteCatalog, all: bool) -> Result<()> {
    let data_dir = cfg.resolve_data_dir()?;
    let min_age = if all {
        Duration::ZERO
    } else {
        Duration::from_secs(cfg.relay.local_grace_secs)
    };
    let removed = reaper::sweep_data_dir(&data_dir, catalog, min_age).await?;
    if removed == 0 {
        println!("Nothing to remove in {}.", data_dir.display());
    } else {
        println!("Removed {} uploaded artifact(s) from {}.", removed, data_dir.display());
    }
    Ok(())
}
