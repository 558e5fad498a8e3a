//! Local artifact files: the bytes of one object as they arrive from the
//! content source, read concurrently by stream readers and later by the relay.
//!
//! Files are written in place under the data dir (no temp rename): readers
//! open the path recorded in the ledger while the fetch is still running, and
//! the ledger state, not the file name, says whether the bytes are complete.

mod checksum;
mod writer;

pub use checksum::{sha256_file, sha256_path};
pub use writer::ArtifactWriter;

use std::path::{Path, PathBuf};

use crate::job::ObjectId;

/// Where the artifact for `id` lives under `data_dir`.
pub fn artifact_path(data_dir: &Path, id: &ObjectId) -> PathBuf {
    data_dir.join(id.file_name())
}

/// Size of the file at `path`, or None if it doesn't exist.
pub async fn file_len(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_uses_file_name() {
        let id = ObjectId::new("chan:7").unwrap();
        let p = artifact_path(Path::new("/data"), &id);
        assert_eq!(p, PathBuf::from("/data/chan:7.bin"));
    }

    #[tokio::test]
    async fn file_len_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(file_len(&dir.path().join("nope")).await, None);
        let p = dir.path().join("x");
        std::fs::write(&p, b"abc").unwrap();
        assert_eq!(file_len(&p).await, Some(3));
    }
}
