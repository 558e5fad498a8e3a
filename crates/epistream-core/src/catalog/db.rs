//! SQLite-backed catalog: connection setup and schema. Queries live in
//! `episodes`.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

// `series.position` and `episodes.season_pos` keep the import order.
// `links` holds download state and may reference ids that are not in
// `episodes`, e.g. objects fetched by direct id.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS series (
        name TEXT PRIMARY KEY,
        position INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS episodes (
        object_id TEXT PRIMARY KEY,
        series TEXT NOT NULL,
        season TEXT NOT NULL,
        season_pos INTEGER NOT NULL,
        episode INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        link TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS episodes_by_season
    ON episodes (series, season, episode)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS links (
        object_id TEXT PRIMARY KEY,
        downloaded INTEGER NOT NULL DEFAULT 0,
        remote_url TEXT,
        sha256 TEXT,
        updated_at INTEGER NOT NULL
    )
    "#,
];

/// Handle to the SQLite catalog, by default at
/// `~/.local/state/epistream/catalog.db`.
#[derive(Clone)]
pub struct SqliteCatalog {
    pub(crate) pool: Pool<Sqlite>,
}

impl std::fmt::Debug for SqliteCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCatalog").finish_non_exhaustive()
    }
}

impl SqliteCatalog {
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("epistream")?;
        Self::open_at(xdg_dirs.get_state_home().join("catalog.db")).await
    }

    /// Open (or create) the database at `path`, creating parent dirs.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("open catalog {}", path.display()))?;
        Self::migrated(pool).await
    }

    /// In-memory catalog on a single connection, so every query sees the
    /// same database.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: Pool<Sqlite>) -> Result<Self> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .context("catalog migration")?;
        }
        Ok(SqliteCatalog { pool })
    }
}

/// Unix seconds for row timestamps.
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
