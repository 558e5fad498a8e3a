//! Catalog store: series → season → episode listings and the per-object
//! download link (`downloaded`, `remote_url`).
//!
//! The pipeline only talks to the `CatalogStore` trait. `SqliteCatalog`
//! (sqlx) is the bundled implementation.

mod db;
mod episodes;
mod import;
mod types;

use anyhow::Result;
use async_trait::async_trait;

use crate::job::ObjectId;

pub use db::SqliteCatalog;
pub use import::ImportReport;
pub use types::{CatalogLink, CatalogSummary, Episode, SeriesSummary};

/// Read access to the catalog plus the single completion callback the
/// pipeline is allowed to use.
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    /// All series in catalog order.
    async fn list_series(&self) -> Result<Vec<SeriesSummary>>;

    /// Season names in catalog order, or None if the series is unknown.
    async fn list_seasons(&self, series: &str) -> Result<Option<Vec<String>>>;

    /// Episodes ordered by episode number, or None if series/season is unknown.
    async fn list_episodes(&self, series: &str, season: &str) -> Result<Option<Vec<Episode>>>;

    /// Download state for one object (None if the catalog has never seen it).
    async fn link(&self, id: &ObjectId) -> Result<Option<CatalogLink>>;

    /// Record that `id` is durably stored at `remote_url`.
    async fn mark_downloaded(&self, id: &ObjectId, remote_url: &str) -> Result<()>;

    /// Record the SHA-256 of the fetched artifact. Optional for stores that
    /// don't keep checksums.
    async fn record_checksum(&self, _id: &ObjectId, _sha256: &str) -> Result<()> {
        Ok(())
    }
}
