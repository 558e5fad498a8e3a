//! Episode and link queries, and the `CatalogStore` impl for `SqliteCatalog`.

mod read;
mod write;

pub(crate) use write::EpisodeRow;

use anyhow::Result;
use async_trait::async_trait;

use super::db::SqliteCatalog;
use super::types::{CatalogLink, Episode, SeriesSummary};
use super::CatalogStore;
use crate::job::ObjectId;

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn list_series(&self) -> Result<Vec<SeriesSummary>> {
        self.series().await
    }

    async fn list_seasons(&self, series: &str) -> Result<Option<Vec<String>>> {
        self.seasons(series).await
    }

    async fn list_episodes(&self, series: &str, season: &str) -> Result<Option<Vec<Episode>>> {
        self.episodes(series, season).await
    }

    async fn link(&self, id: &ObjectId) -> Result<Option<CatalogLink>> {
        self.get_link(id).await
    }

    async fn mark_downloaded(&self, id: &ObjectId, remote_url: &str) -> Result<()> {
        self.set_downloaded(id, remote_url).await
    }

    async fn record_checksum(&self, id: &ObjectId, sha256: &str) -> Result<()> {
        self.set_checksum(id, sha256).await
    }
}
