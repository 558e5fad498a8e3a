//! `epistream status` – catalog counts and local artifact usage.

use anyhow::Result;
use epistream_core::catalog::SqliteCatalog;
use epistream_core::config::EpiConfig;
use epistream_core::job::ObjectId;
use std::path::Path;

pub async fn run_status(cfg: &EpiConfig, catalog: &SqliteCatalog) -> Result<()> {
    let summary = catalog.summary().await?;
    println!("{:<12} {}", "series", summary.series);
    println!("{:<12} {}", "episodes", summary.episodes);
    println!("{:<12} {}", "downloaded", summary.downloaded);

    let data_dir = cfg.resolve_data_dir()?;
    let (files, bytes) = local_usage(&data_dir).await?;
    println!(
        "{:<12} {} file(s), {:.1} MiB in {}",
        "local",
        files,
        bytes as f64 / 1_048_576.0,
        data_dir.display()
    );
    Ok(())
}

async fn local_usage(dir: &Path) -> Result<(usize, u64)> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(e.into()),
    };
    let (mut files, mut bytes) = (0, 0);
    while let Some(entry) = entries.next_entry().await? {
        let is_artifact = entry
            .file_name()
            .to_str()
            .and_then(ObjectId::from_file_name)
            .is_some();
        if !is_artifact {
            continue;
        }
        let meta = entry.metadata().await?;
        if meta.is_file() {
            files += 1;
            bytes += meta.len();
        }
    }
    Ok((files, bytes))
}
