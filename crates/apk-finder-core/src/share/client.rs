//! Resilient access to one share.

use super::retry::{retry_async, RetryConfig};
use super::stream::{reader_stream, ByteStream};
use super::{ByteRange, ShareBackend};
use crate::config::{NetworkConfig, PathsConfig, ShareConfig};
use crate::error::{ApkFinderError, Result};
use crate::models::{FileStat, ShareEntry};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncSeekExt;
use tracing::{debug, info, warn};

/// A connected share plus the retry rules for talking to it.
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct ShareClient {
    config: ShareConfig,
    backend: Arc<dyn ShareBackend>,
    retry: RetryConfig,
    scratch_dir: PathBuf,
}

impl ShareClient {
    pub fn new(config: ShareConfig, backend: Arc<dyn ShareBackend>, scratch_dir: &Path) -> Self {
        Self {
            config,
            backend,
            retry: RetryConfig::contention(),
            scratch_dir: scratch_dir.to_path_buf(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ShareConfig {
        &self.config
    }

    pub async fn list_directories(&self, path: &str) -> Result<Vec<String>> {
        self.backend.list_directories(path).await
    }

    pub async fn list_entries(&self, path: &str) -> Result<Vec<ShareEntry>> {
        self.backend.list_entries(path).await
    }

    pub async fn stat_file(&self, path: &str) -> Result<FileStat> {
        self.backend.stat(path).await
    }

    /// Best known size of a file: the stat size when non-zero, otherwise an
    /// open-and-seek probe. `None` means the size is unknown.
    pub async fn resolve_size(&self, path: &str, stat: &FileStat) -> Option<u64> {
        if let Some(size) = stat.known_size() {
            return Some(size);
        }

        match self.backend.probe_size(path).await {
            Ok(Some(size)) if size > 0 => {
                debug!("Probed size of {}: {} bytes", path, size);
                Some(size)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Size probe failed for {}: {}", path, e);
                None
            }
        }
    }

    /// Open a stream, retrying contention errors with backoff.
    pub async fn open_direct(&self, path: &str, range: Option<ByteRange>) -> Result<ByteStream> {
        let label = format!("open {}", path);
        let (result, _stats) = retry_async(
            &self.retry,
            &label,
            || self.backend.open_read(path, range),
            ApkFinderError::is_contention,
        )
        .await;
        result
    }

    /// Open a stream, falling back to a local copy when the file stays busy.
    pub async fn open_read_stream(
        &self,
        path: &str,
        range: Option<ByteRange>,
    ) -> Result<ByteStream> {
        match self.open_direct(path, range).await {
            Err(e) if e.is_contention() => {
                info!("{} is still busy, serving from a local copy", path);
                self.copy_then_stream(path, range).await
            }
            other => other,
        }
    }

    /// Copy the file into the scratch directory and stream the copy.
    ///
    /// The temporary file is removed when the returned stream is dropped.
    pub async fn copy_then_stream(
        &self,
        path: &str,
        range: Option<ByteRange>,
    ) -> Result<ByteStream> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| ApkFinderError::io_with_path(e, &self.scratch_dir))?;

        let temp = tempfile::Builder::new()
            .prefix(PathsConfig::TEMP_FILE_PREFIX)
            .suffix(".apk")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| ApkFinderError::io_with_path(e, &self.scratch_dir))?
            .into_temp_path();

        let label = format!("copy {}", path);
        let (copied, _stats) = retry_async(
            &self.retry,
            &label,
            || self.backend.copy_to_local(path, &temp),
            ApkFinderError::is_contention,
        )
        .await;
        let copied = copied?;
        debug!("Copied {} ({} bytes) to {}", path, copied, temp.display());

        let mut file = tokio::fs::File::open(&temp)
            .await
            .map_err(|e| ApkFinderError::io_with_path(e, &*temp))?;

        let limit = match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start))
                    .await
                    .map_err(|e| ApkFinderError::io_with_path(e, &*temp))?;
                range.len()
            }
            None => None,
        };

        Ok(reader_stream(
            file,
            limit,
            NetworkConfig::READ_CHUNK_SIZE,
            NetworkConfig::READ_TIMEOUT,
            Some(temp),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::MockBackend;
    use bytes::Bytes;
    use chrono::Utc;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    const APK: &str = "/AppA/release/app-release.apk";

    fn share_config() -> ShareConfig {
        ShareConfig {
            id: "server_1".to_string(),
            path: r"\\host\builds".to_string(),
            display_name: "Server 1".to_string(),
            mount: None,
        }
    }

    fn setup() -> (TempDir, Arc<MockBackend>, ShareClient) {
        let scratch = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new("server_1"));
        mock.add_file(APK, (0..100u8).collect::<Vec<_>>(), Utc::now());
        let client = ShareClient::new(share_config(), mock.clone(), scratch.path());
        (scratch, mock, client)
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test(start_paused = true)]
    async fn test_contention_retried_until_success() {
        let (_scratch, mock, client) = setup();
        mock.set_busy(APK, 2);

        let data = collect(client.open_read_stream(APK, None).await.unwrap()).await;
        assert_eq!(data.len(), 100);
        assert_eq!(mock.calls().open_read(), 3);
        assert_eq!(mock.calls().copy_to_local(), 0);
    }

    #[tokio::test]
    async fn test_persistent_contention_falls_back_to_copy() {
        let (scratch, mock, client) = setup();
        mock.set_locked(APK, true);

        let stream = client
            .open_read_stream(APK, Some(ByteRange::new(10, Some(19))))
            .await
            .unwrap();
        assert_eq!(mock.calls().open_read(), 3);
        assert_eq!(mock.calls().copy_to_local(), 1);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 1);

        assert_eq!(collect(stream).await, (10..20u8).collect::<Vec<_>>());
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_retried() {
        let (_scratch, mock, client) = setup();
        let err = client
            .open_read_stream("/AppA/nope.apk", None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApkFinderError::FileNotFound(_)));
        assert_eq!(mock.calls().open_read(), 1);
        assert_eq!(mock.calls().copy_to_local(), 0);
    }

    #[tokio::test]
    async fn test_resolve_size_probes_on_zero() {
        let (_scratch, mock, client) = setup();
        mock.set_zero_stat(APK);

        let stat = client.stat_file(APK).await.unwrap();
        assert_eq!(stat.size, Some(0));
        assert_eq!(client.resolve_size(APK, &stat).await, Some(100));
        assert_eq!(mock.calls().probe_size(), 1);
    }
}
