//! Import of the `video.json` catalog layout:
//! `{ "<series>": { "<season>": [ { "episode": 1, "title": "...", "url": "..." } ] } }`.
//!
//! Order of series and seasons follows the JSON document (serde_json is built
//! with `preserve_order`). Episodes whose link can't be turned into an object
//! id are skipped and counted.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

use super::db::SqliteCatalog;
use super::episodes::EpisodeRow;
use crate::job::ObjectId;

#[derive(Debug, Deserialize)]
struct RawEpisode {
    episode: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    url: String,
    /// Explicit id; derived from `url` when absent.
    #[serde(default)]
    object_id: Option<String>,
}

/// What an import wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub series: usize,
    pub seasons: usize,
    pub episodes: usize,
    pub skipped: usize,
}

impl SqliteCatalog {
    /// Import a `video.json` file. Re-importing updates rows in place.
    pub async fn import_file(&self, path: impl AsRef<Path>) -> Result<ImportReport> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        self.import_json(&data)
            .await
            .with_context(|| format!("import {}", path.display()))
    }

    /// Import a `video.json` document held in memory, in one transaction.
    pub async fn import_json(&self, data: &str) -> Result<ImportReport> {
        let root: Map<String, Value> =
            serde_json::from_str(data).context("catalog root must be a JSON object")?;

        let mut report = ImportReport::default();
        let mut tx = self.pool.begin().await?;

        for (series_pos, (series, seasons)) in root.iter().enumerate() {
            let seasons = seasons
                .as_object()
                .with_context(|| format!("series {series:?} must map season names to episode lists"))?;
            SqliteCatalog::upsert_series(&mut *tx, series, series_pos as i64).await?;
            report.series += 1;

            for (season_pos, (season, episodes)) in seasons.iter().enumerate() {
                let episodes: Vec<RawEpisode> = serde_json::from_value(episodes.clone())
                    .with_context(|| format!("{series} / {season}: bad episode list"))?;
                report.seasons += 1;

                for ep in &episodes {
                    let id = match &ep.object_id {
                        Some(raw) => ObjectId::new(raw.as_str()),
                        None => ObjectId::from_link(&ep.url),
                    };
                    let object_id = match id {
                        Ok(id) => id,
                        Err(e) => {
                            tracing::warn!(%series, %season, episode = ep.episode, "skipping episode: {}", e);
                            report.skipped += 1;
                            continue;
                        }
                    };
                    let row = EpisodeRow {
                        object_id: &object_id,
                        series,
                        season,
                        season_pos: season_pos as i64,
                        episode: ep.episode,
                        title: &ep.title,
                        description: ep.description.as_deref(),
                        link: &ep.url,
                    };
                    SqliteCatalog::upsert_episode(&mut *tx, &row).await?;
                    report.episodes += 1;
                }
            }
        }

        tx.commit().await?;
        tracing::info!(
            series = report.series,
            seasons = report.seasons,
            episodes = report.episodes,
            skipped = report.skipped,
            "catalog import finished"
        );
        Ok(report)
    }
}
