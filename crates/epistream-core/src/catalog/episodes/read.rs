//! Catalog read operations: series, seasons, episodes, links.

use anyhow::{Context, Result};
use sqlx::Row;

use super::super::db::SqliteCatalog;
use super::super::types::{CatalogLink, CatalogSummary, Episode, SeriesSummary};
use crate::job::ObjectId;

impl SqliteCatalog {
    pub(crate) async fn series(&self) -> Result<Vec<SeriesSummary>> {
        let rows = sqlx::query("SELECT name FROM series ORDER BY position ASC, name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| SeriesSummary { name: r.get("name") })
            .collect())
    }

    pub(crate) async fn seasons(&self, series: &str) -> Result<Option<Vec<String>>> {
        let rows = sqlx::query(
            r#"
            SELECT season, MIN(season_pos) AS pos
            FROM episodes
            WHERE series = ?1
            GROUP BY season
            ORDER BY pos ASC
            "#,
        )
        .bind(series)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.into_iter().map(|r| r.get("season")).collect()))
    }

    pub(crate) async fn episodes(&self, series: &str, season: &str) -> Result<Option<Vec<Episode>>> {
        let rows = sqlx::query(
            r#"
            SELECT e.object_id, e.episode, e.title, e.description, e.link,
                   COALESCE(l.downloaded, 0) AS downloaded, l.remote_url
            FROM episodes e
            LEFT JOIN links l ON l.object_id = e.object_id
            WHERE e.series = ?1 AND e.season = ?2
            ORDER BY e.episode ASC, e.object_id ASC
            "#,
        )
        .bind(series)
        .bind(season)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let raw: String = r.get("object_id");
            let object_id =
                ObjectId::new(raw).context("catalog holds an invalid object id")?;
            let downloaded: i64 = r.get("downloaded");
            out.push(Episode {
                object_id,
                episode: r.get("episode"),
                title: r.get("title"),
                description: r.get("description"),
                url: r.get("link"),
                downloaded: downloaded != 0,
                remote_url: r.get("remote_url"),
            });
        }
        Ok(Some(out))
    }

    pub(crate) async fn get_link(&self, id: &ObjectId) -> Result<Option<CatalogLink>> {
        let row = sqlx::query("SELECT downloaded, remote_url FROM links WHERE object_id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| {
            let downloaded: i64 = r.get("downloaded");
            CatalogLink {
                downloaded: downloaded != 0,
                remote_url: r.get("remote_url"),
            }
        }))
    }

    /// Stored SHA-256 of the fetched artifact, if recorded.
    pub async fn checksum(&self, id: &ObjectId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT sha256 FROM links WHERE object_id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.get("sha256")))
    }

    /// Counts of series, episodes and downloaded episodes.
    pub async fn summary(&self) -> Result<CatalogSummary> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM series) AS series,
                (SELECT COUNT(*) FROM episodes) AS episodes,
                (SELECT COUNT(*) FROM episodes e
                    JOIN links l ON l.object_id = e.object_id
                    WHERE l.downloaded = 1) AS downloaded
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(CatalogSummary {
            series: row.get("series"),
            episodes: row.get("episodes"),
            downloaded: row.get("downloaded"),
        })
    }
}
