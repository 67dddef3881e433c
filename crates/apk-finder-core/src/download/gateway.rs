//! Download gateway: resolve a (share, path) request into a response.

use super::disposition::content_disposition;
use super::hashing::hash_while_streaming;
use super::range::{parse_range_header, plan_range};
use super::strategy::{default_chain, open_with_chain, StreamStrategy};
use crate::catalog::CatalogStore;
use crate::config::DownloadConfig;
use crate::error::{ApkFinderError, Result};
use crate::models::{file_name_of, normalize_share_path};
use crate::share::{ByteStream, ShareManager};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One download request as received from a client.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub share: String,
    pub path: String,
    /// Name to offer the client; defaults to the file's own name.
    pub filename: Option<String>,
    /// Raw `Range` header value.
    pub range: Option<String>,
}

/// Everything needed to write the HTTP response.
pub struct DownloadResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: ByteStream,
    /// Strategy that opened the stream.
    pub strategy: &'static str,
}

impl DownloadResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Serves file bytes from the shares.
pub struct DownloadGateway {
    catalog: Arc<dyn CatalogStore>,
    shares: Arc<ShareManager>,
    chain: Vec<Box<dyn StreamStrategy>>,
}

impl DownloadGateway {
    pub fn new(catalog: Arc<dyn CatalogStore>, shares: Arc<ShareManager>) -> Self {
        Self::with_chain(catalog, shares, default_chain())
    }

    pub fn with_chain(
        catalog: Arc<dyn CatalogStore>,
        shares: Arc<ShareManager>,
        chain: Vec<Box<dyn StreamStrategy>>,
    ) -> Self {
        Self {
            catalog,
            shares,
            chain,
        }
    }

    /// Resolve a download into status, headers and a body stream.
    ///
    /// The download counter is bumped once the stream is open. A full read
    /// of a file with a known size records its MD5 when the body completes.
    pub async fn resolve_download(&self, request: &DownloadRequest) -> Result<DownloadResponse> {
        let path = normalize_share_path(&request.path)?;
        if path == "/" {
            return Err(ApkFinderError::Validation {
                field: "path".to_string(),
                message: "a file path is required".to_string(),
            });
        }

        let client = self.shares.get(&request.share).await?;

        let stat = client.stat_file(&path).await?;
        if !stat.exists {
            return Err(ApkFinderError::FileNotFound(path));
        }

        let size = client.resolve_size(&path, &stat).await;
        let spec = request.range.as_deref().and_then(parse_range_header);
        let plan = plan_range(spec, size)?;

        let (stream, strategy) = open_with_chain(&self.chain, &client, &path, plan.range).await?;

        match self.catalog.increment_download_count(&request.share, &path) {
            Ok(true) => {}
            Ok(false) => debug!(
                "{}:{} is not in the catalog, count not recorded",
                request.share, path
            ),
            Err(e) => warn!(
                "Failed to record download of {}:{}: {}",
                request.share, path, e
            ),
        }

        let body = match (plan.range, size) {
            (None, Some(size)) => {
                let catalog = self.catalog.clone();
                let share = request.share.clone();
                let hashed_path = path.clone();
                hash_while_streaming(
                    stream,
                    size,
                    format!("{}:{}", request.share, path),
                    Box::new(move |hash| record_content_hash(catalog, share, hashed_path, hash)),
                )
            }
            _ => stream,
        };

        let filename = request
            .filename
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| file_name_of(&path));

        let mut headers = vec![
            ("Content-Type", DownloadConfig::CONTENT_TYPE.to_string()),
            ("Accept-Ranges", "bytes".to_string()),
            ("Content-Disposition", content_disposition(filename)),
        ];
        if let Some(length) = plan.content_length {
            headers.push(("Content-Length", length.to_string()));
        }
        if let Some(content_range) = &plan.content_range {
            headers.push(("Content-Range", content_range.clone()));
        }

        info!(
            "Serving {}:{} ({}, size {:?}, {}) via {}",
            request.share,
            path,
            plan.status,
            size,
            plan.content_range.as_deref().unwrap_or("full"),
            strategy
        );

        Ok(DownloadResponse {
            status: plan.status,
            headers,
            body,
            strategy,
        })
    }
}

/// Persist a completed download's MD5 off the async worker threads.
fn record_content_hash(
    catalog: Arc<dyn CatalogStore>,
    share: String,
    path: String,
    hash: String,
) {
    let write = move || match catalog.set_content_hash(&share, &path, &hash) {
        Ok(true) => debug!("Recorded MD5 {} for {}:{}", hash, share, path),
        Ok(false) => {}
        Err(e) => warn!("Failed to record MD5 for {}:{}: {}", share, path, e),
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(write);
        }
        Err(_) => write(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::config::ShareConfig;
    use crate::models::FileRecord;
    use crate::share::{MockBackend, ShareBackend};
    use bytes::Bytes;
    use chrono::Utc;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    const APK: &str = "/AppA/release/app.apk";

    struct Fixture {
        _scratch: TempDir,
        mock: Arc<MockBackend>,
        catalog: Arc<SqliteCatalog>,
        gateway: DownloadGateway,
    }

    fn fixture() -> Fixture {
        let scratch = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new("server_1"));
        mock.add_file(APK, (0..100u8).collect::<Vec<_>>(), Utc::now());
        let backend = mock.clone();
        let shares = Arc::new(ShareManager::with_factory(
            vec![ShareConfig {
                id: "server_1".to_string(),
                path: r"\\host\builds".to_string(),
                display_name: "Server 1".to_string(),
                mount: None,
            }],
            scratch.path(),
            Arc::new(move |_: &ShareConfig| backend.clone() as Arc<dyn ShareBackend>),
        ));
        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
        catalog
            .set_files(
                "server_1",
                "AppA",
                vec![FileRecord::discovered(
                    APK.to_string(),
                    100,
                    Utc::now(),
                    r"\\host\builds",
                )],
            )
            .unwrap();
        let gateway = DownloadGateway::new(catalog.clone(), shares);
        Fixture {
            _scratch: scratch,
            mock,
            catalog,
            gateway,
        }
    }

    fn request(path: &str, range: Option<&str>) -> DownloadRequest {
        DownloadRequest {
            share: "server_1".to_string(),
            path: path.to_string(),
            filename: None,
            range: range.map(str::to_string),
        }
    }

    async fn body(response: DownloadResponse) -> Vec<u8> {
        let chunks: Vec<Bytes> = response.body.try_collect().await.unwrap();
        chunks.concat()
    }

    /// The hash is written on the blocking pool after the body ends.
    async fn wait_for_hash(catalog: &SqliteCatalog) -> Option<String> {
        for _ in 0..100 {
            let record = catalog.find_file("server_1", APK).unwrap().unwrap();
            if record.content_hash.is_some() {
                return record.content_hash;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_full_download_records_count_and_hash() {
        let f = fixture();
        let response = f.gateway.resolve_download(&request(APK, None)).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-length"), Some("100"));
        assert_eq!(response.header("accept-ranges"), Some("bytes"));
        assert_eq!(
            response.header("content-disposition"),
            Some("attachment; filename=\"app.apk\"")
        );

        let data = body(response).await;
        let expected: Vec<u8> = (0..100u8).collect();
        assert_eq!(data, expected);

        let record = f.catalog.find_file("server_1", APK).unwrap().unwrap();
        assert_eq!(record.download_count, 1);
        assert_eq!(
            wait_for_hash(&f.catalog).await,
            Some(format!("{:x}", md5::compute(&expected)))
        );
    }

    #[tokio::test]
    async fn test_range_download() {
        let f = fixture();
        let response = f
            .gateway
            .resolve_download(&request(APK, Some("bytes=10-19")))
            .await
            .unwrap();
        assert_eq!(response.status, 206);
        assert_eq!(response.header("content-range"), Some("bytes 10-19/100"));
        assert_eq!(response.header("content-length"), Some("10"));
        assert_eq!(body(response).await, (10..20u8).collect::<Vec<_>>());

        // Range reads never record a hash.
        let record = f.catalog.find_file("server_1", APK).unwrap().unwrap();
        assert_eq!(record.download_count, 1);
        assert_eq!(record.content_hash, None);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let f = fixture();
        let err = f
            .gateway
            .resolve_download(&request(APK, Some("bytes=200-300")))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApkFinderError::InvalidRange { size: 100 }));
        assert_eq!(f.mock.calls().open_read(), 0);
    }

    #[tokio::test]
    async fn test_not_found_cases() {
        let f = fixture();
        let err = f
            .gateway
            .resolve_download(&request("/AppA/missing.apk", None))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApkFinderError::FileNotFound(_)));

        let mut req = request(APK, None);
        req.share = "server_9".to_string();
        let err = f.gateway.resolve_download(&req).await.err().unwrap();
        assert!(matches!(err, ApkFinderError::UnknownShare(_)));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let f = fixture();
        let err = f
            .gateway
            .resolve_download(&request("/AppA/../../secret", None))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_zero_stat_size_is_probed() {
        let f = fixture();
        f.mock.set_zero_stat(APK);
        let response = f.gateway.resolve_download(&request(APK, None)).await.unwrap();
        assert_eq!(response.header("content-length"), Some("100"));
        assert_eq!(f.mock.calls().probe_size(), 1);
    }

    #[tokio::test]
    async fn test_unknown_size_is_streamed_without_length() {
        let f = fixture();
        f.mock.set_unknown_size(APK);

        let response = f.gateway.resolve_download(&request(APK, None)).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-length"), None);
        assert_eq!(body(response).await, (0..100u8).collect::<Vec<_>>());

        let response = f
            .gateway
            .resolve_download(&request(APK, Some("bytes=10-1000")))
            .await
            .unwrap();
        assert_eq!(response.status, 206);
        assert_eq!(response.header("content-range"), Some("bytes 10-1000/*"));
        assert_eq!(response.header("content-length"), None);
        assert_eq!(body(response).await, (10..100u8).collect::<Vec<_>>());

        let response = f
            .gateway
            .resolve_download(&request(APK, Some("bytes=90-")))
            .await
            .unwrap();
        assert_eq!(response.status, 206);
        assert_eq!(response.header("content-range"), None);
        assert_eq!(body(response).await, (90..100u8).collect::<Vec<_>>());

        // Without a known size a full read cannot be verified.
        let record = f.catalog.find_file("server_1", APK).unwrap().unwrap();
        assert_eq!(record.download_count, 3);
        assert_eq!(record.content_hash, None);
    }

    #[tokio::test]
    async fn test_custom_filename() {
        let f = fixture();
        let mut req = request(APK, None);
        req.filename = Some("测试.apk".to_string());
        let response = f.gateway.resolve_download(&req).await.unwrap();
        assert_eq!(
            response.header("content-disposition"),
            Some("attachment; filename=\"download.apk\"; filename*=UTF-8''%E6%B5%8B%E8%AF%95.apk")
        );
    }
}
