//! Catalog write operations: episode upserts and download links.

use anyhow::Result;

use super::super::db::{unix_timestamp, SqliteCatalog};
use crate::job::ObjectId;

/// Fields for inserting or replacing one episode row.
#[derive(Debug, Clone)]
pub(crate) struct EpisodeRow<'a> {
    pub object_id: &'a ObjectId,
    pub series: &'a str,
    pub season: &'a str,
    pub season_pos: i64,
    pub episode: i64,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub link: &'a str,
}

impl SqliteCatalog {
    pub(crate) async fn upsert_series<'e, E>(exec: E, name: &str, position: i64) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO series (name, position) VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET position = excluded.position
            "#,
        )
        .bind(name)
        .bind(position)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub(crate) async fn upsert_episode<'e, E>(exec: E, row: &EpisodeRow<'_>) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO episodes (
                object_id, series, season, season_pos, episode,
                title, description, link, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(object_id) DO UPDATE SET
                series = excluded.series,
                season = excluded.season,
                season_pos = excluded.season_pos,
                episode = excluded.episode,
                title = excluded.title,
                description = excluded.description,
                link = excluded.link
            "#,
        )
        .bind(row.object_id.as_str())
        .bind(row.series)
        .bind(row.season)
        .bind(row.season_pos)
        .bind(row.episode)
        .bind(row.title)
        .bind(row.description)
        .bind(row.link)
        .bind(unix_timestamp())
        .execute(exec)
        .await?;
        Ok(())
    }

    pub(crate) async fn set_downloaded(&self, id: &ObjectId, remote_url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO links (object_id, downloaded, remote_url, updated_at)
            VALUES (?1, 1, ?2, ?3)
            ON CONFLICT(object_id) DO UPDATE SET
                downloaded = 1,
                remote_url = excluded.remote_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(remote_url)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub(crate) async fn set_checksum(&self, id: &ObjectId, sha256: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO links (object_id, downloaded, sha256, updated_at)
            VALUES (?1, 0, ?2, ?3)
            ON CONFLICT(object_id) DO UPDATE SET
                sha256 = excluded.sha256,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(sha256)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Forget the remote copy (e.g. it expired at the storage provider) so the
    /// next request fetches again.
    pub async fn clear_download(&self, id: &ObjectId) -> Result<bool> {
        let n = sqlx::query(
            r#"
            UPDATE links
            SET downloaded = 0, remote_url = NULL, updated_at = ?1
            WHERE object_id = ?2
            "#,
        )
        .bind(unix_timestamp())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(n > 0)
    }
}
