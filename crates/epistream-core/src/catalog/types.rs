//! Types returned by the catalog store.

use serde::Serialize;

use crate::job::ObjectId;

/// Download state of one object as recorded by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogLink {
    pub downloaded: bool,
    pub remote_url: Option<String>,
}

impl CatalogLink {
    /// The remote URL, but only when the object is marked downloaded.
    pub fn uploaded_url(&self) -> Option<&str> {
        if self.downloaded {
            self.remote_url.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesSummary {
    pub name: String,
}

/// One episode row, as served by `/catalog/series/{series}/{season}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Episode {
    pub object_id: ObjectId,
    pub episode: i64,
    pub title: String,
    pub description: Option<String>,
    /// Link into the content source the id was derived from.
    pub url: String,
    pub downloaded: bool,
    pub remote_url: Option<String>,
}

/// Counts used by `epistream status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    pub series: i64,
    pub episodes: i64,
    pub downloaded: i64,
}
