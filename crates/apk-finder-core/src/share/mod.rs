//! Remote share access.
//!
//! [`ShareBackend`] is the raw protocol seam: list one directory level, stat a
//! file, open a (ranged) byte stream, copy a file to local disk. Backends
//! classify their failures into [`ApkFinderError`](crate::error::ApkFinderError)
//! variants; they never retry.
//!
//! [`ShareClient`] wraps one backend with the resilience rules shared by the
//! scanner and the download gateway (contention retry, copy-then-stream
//! fallback, layered size resolution). [`ShareManager`] owns one lazily
//! connected client per configured share.

mod client;
mod manager;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod mounted;
mod retry;
mod stream;

pub use client::ShareClient;
pub use manager::{BackendFactory, ShareManager};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockBackend, MockCalls};
pub use mounted::MountedBackend;
pub use retry::{retry_async, RetryConfig, RetryStats};
pub use stream::{reader_stream, ByteStream};

use crate::error::Result;
use crate::models::{FileStat, ShareEntry};
use async_trait::async_trait;
use std::path::Path;

/// Inclusive byte range of a read. `end: None` reads to end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered, when bounded.
    pub fn len(&self) -> Option<u64> {
        self.end
            .map(|end| end.saturating_sub(self.start).saturating_add(1))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

/// Raw operations against one remote share.
///
/// All paths are share-rooted and already normalised (`/AppA/x.apk`).
#[async_trait]
pub trait ShareBackend: Send + Sync {
    /// Share identifier, for logging.
    fn name(&self) -> &str;

    /// Establish (or verify) the session with the share.
    async fn connect(&self) -> Result<()>;

    /// One level of a directory: subdirectories and files.
    ///
    /// Entry attributes may be missing; callers stat on demand.
    async fn list_entries(&self, path: &str) -> Result<Vec<ShareEntry>>;

    /// Names of the immediate subdirectories of `path`.
    async fn list_directories(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .list_entries(path)
            .await?
            .into_iter()
            .filter(|e| e.is_dir())
            .map(|e| e.name)
            .collect())
    }

    /// Lightweight metadata query. A missing file is `exists: false`, not an
    /// error.
    async fn stat(&self, path: &str) -> Result<FileStat>;

    /// Alternate size lookup used when [`stat`](Self::stat) reports zero or
    /// nothing, by opening the file and seeking to its end.
    async fn probe_size(&self, path: &str) -> Result<Option<u64>>;

    /// Open a byte stream over the whole file or an inclusive range.
    async fn open_read(&self, path: &str, range: Option<ByteRange>) -> Result<ByteStream>;

    /// Copy the whole file to a local path, returning the bytes written.
    async fn copy_to_local(&self, path: &str, dest: &Path) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_len() {
        assert_eq!(ByteRange::new(10, Some(19)).len(), Some(10));
        assert_eq!(ByteRange::new(0, Some(0)).len(), Some(1));
        assert_eq!(ByteRange::new(5, None).len(), None);
        assert_eq!(ByteRange::new(0, Some(u64::MAX)).len(), Some(u64::MAX));
    }
}
