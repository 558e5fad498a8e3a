//! `epistream import <json>` – load series, seasons and episodes.

use anyhow::Result;
use epistream_core::catalog::SqliteCatalog;
use std::path::Path;

pub async fn run_import(catalog: &SqliteCatalog, path: &Path) -> Result<()> {
    let report = catalog.import_file(path).await?;
    println!(
        "Imported {} series, {} seasons, {} episodes from {}",
        report.series,
        report.seasons,
        report.episodes,
        path.display()
    );
    if report.skipped > 0 {
        println!("Skipped {} episode(s) with unusable links (see log).", report.skipped);
    }
    Ok(())
}
