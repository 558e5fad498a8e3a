//! Object identifiers and derivation from content-source links.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

const MAX_LEN: usize = 128;
const ARTIFACT_EXT: &str = ".bin";

/// Stable identifier of one remote media object across catalog, fetch and storage.
///
/// Restricted to `[A-Za-z0-9._:-]` so it is safe as a URL path segment, a file
/// name and a storage key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid object id {0:?}")]
pub struct InvalidObjectId(pub String);

impl ObjectId {
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidObjectId> {
        let s = s.into();
        let valid = !s.is_empty()
            && s.len() <= MAX_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
            && s != "."
            && s != "..";
        if valid {
            Ok(ObjectId(s))
        } else {
            Err(InvalidObjectId(s))
        }
    }

    /// Derive an id from a content-source link.
    ///
    /// `https://t.me/<channel>/<msg>` becomes `<channel>:<msg>` and
    /// `https://t.me/c/<chat>/<msg>` becomes `c:<chat>:<msg>`; other URLs use
    /// their non-empty path segments joined with `:`.
    pub fn from_link(link: &str) -> Result<Self, InvalidObjectId> {
        let url = Url::parse(link).map_err(|_| InvalidObjectId(link.to_string()))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        if segments.is_empty() {
            return Err(InvalidObjectId(link.to_string()));
        }
        ObjectId::new(segments.join(":")).map_err(|_| InvalidObjectId(link.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name used for the local artifact. Ids never contain `/`, so the
    /// id is used verbatim and `from_file_name` can reverse it.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.0, ARTIFACT_EXT)
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        name.strip_suffix(ARTIFACT_EXT)
            .and_then(|stem| ObjectId::new(stem).ok())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = InvalidObjectId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ObjectId::new(s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> String {
        id.0
    }
}

impl std::str::FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::new(s)
    }
}
