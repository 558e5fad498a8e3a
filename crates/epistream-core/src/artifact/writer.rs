//! Offset writer for a growing artifact.

use bytes::Bytes;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Writer owned by the fetch worker of one job. Every write goes to an
/// explicit offset (pwrite), so a retried attempt can continue where the
/// previous one stopped without reopening or seeking.
#[derive(Clone)]
pub struct ArtifactWriter {
    file: Arc<File>,
    path: PathBuf,
}

impl std::fmt::Debug for ArtifactWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactWriter").field("path", &self.path).finish()
    }
}

impl ArtifactWriter {
    /// Create (or truncate) the artifact at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Reserve `size` bytes once the total is known. On Unix tries
    /// `posix_fallocate` so a full disk fails the job up front; otherwise
    /// (or on failure) falls back to `set_len`.
    pub fn preallocate(&self, size: u64) -> io::Result<()> {
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            if r == libc::ENOSPC {
                return Err(io::Error::from_raw_os_error(r));
            }
            tracing::debug!(errno = r, path = %self.path.display(), "posix_fallocate failed, falling back to set_len");
        }
        if self.file.metadata()?.len() < size {
            self.file.set_len(size)?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn write_at_blocking(file: &File, offset: u64, data: &[u8]) -> io::Result<()> {
        file.write_all_at(data, offset)
    }

    #[cfg(not(unix))]
    fn write_at_blocking(file: &File, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    /// Write `data` at `offset` on the blocking pool.
    pub async fn write_at(&self, offset: u64, data: Bytes) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || Self::write_at_blocking(&file, offset, &data))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    /// Trim the file to exactly `len` bytes (drops any preallocated tail a
    /// short or unknown-length body left behind) and fsync.
    pub async fn finish(&self, len: u64) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            if file.metadata()?.len() != len {
                file.set_len(len)?;
            }
            file.sync_all()
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}
