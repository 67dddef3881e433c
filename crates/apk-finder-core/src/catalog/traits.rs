//! Catalog store trait and types.

use crate::error::Result;
use crate::models::{DirectoryMeta, FileRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// All records of one (share, directory) bucket.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub share: String,
    pub directory: String,
    pub files: Vec<FileRecord>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog storage backend.
///
/// All operations are synchronous to match rusqlite's API. Every write to a
/// bucket is atomic with respect to readers and other writers.
pub trait CatalogStore: Send + Sync {
    /// Records of one bucket, or `None` if the bucket was never written.
    fn get_files(&self, share: &str, directory: &str) -> Result<Option<Vec<FileRecord>>>;

    /// Replace the records of one bucket.
    ///
    /// `download_count` and `content_hash` are carried over from the stored
    /// record with the same `relative_path`; the hash only while
    /// `file_size` is unchanged.
    fn set_files(&self, share: &str, directory: &str, records: Vec<FileRecord>) -> Result<()>;

    fn get_meta(&self, share: &str, directory: &str) -> Result<Option<DirectoryMeta>>;

    fn set_meta(&self, share: &str, directory: &str, meta: &DirectoryMeta) -> Result<()>;

    /// Set every stored subdirectory count in scope to the force-rescan
    /// sentinel. Returns the number of buckets reset.
    fn reset_meta(&self, share: Option<&str>) -> Result<usize>;

    /// All buckets, optionally restricted to one share.
    fn list_entries(&self, share: Option<&str>) -> Result<Vec<CatalogEntry>>;

    /// Directory names known for a share, from records or metadata.
    fn list_directories(&self, share: &str) -> Result<Vec<String>>;

    /// Drop a bucket and its metadata. Returns whether anything existed.
    fn remove_directory(&self, share: &str, directory: &str) -> Result<bool>;

    /// Bump the download counter of one record. Returns false when the
    /// record is not in the catalog.
    fn increment_download_count(&self, share: &str, relative_path: &str) -> Result<bool>;

    /// Record the MD5 of one file. Returns false when the record is gone.
    fn set_content_hash(&self, share: &str, relative_path: &str, hash: &str) -> Result<bool>;

    fn find_file(&self, share: &str, relative_path: &str) -> Result<Option<FileRecord>>;

    /// Check that the store is reachable.
    fn ping(&self) -> Result<()>;
}
