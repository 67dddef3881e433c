//! APK Finder Core - Headless indexing and retrieval of APKs on remote shares.
//!
//! This crate indexes APK files spread over several SMB shares into a
//! catalog, answers keyword searches over it and streams files back with
//! HTTP range support. It can be used without any HTTP layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use apk_finder_core::{ApkFinder, SearchQuery, ShareConfig};
//!
//! #[tokio::main]
//! async fn main() -> apk_finder_core::Result<()> {
//!     let finder = ApkFinder::builder("./data")
//!         .shares(ShareConfig::from_env())
//!         .build()?;
//!
//!     // Index every share once
//!     finder.scan_now().await;
//!
//!     let page = finder.search(&SearchQuery {
//!         keyword: "shop|release".to_string(),
//!         ..Default::default()
//!     })?;
//!     println!("Found {} APKs", page.total);
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod models;
pub mod scanner;
pub mod search;
pub mod share;

mod api;

// Re-export commonly used types
pub use api::{
    ApkFinderBuilder, FileInfo, HealthReport, ServerStatus, ServiceHealth, ShareSummary,
    SystemStatus,
};
pub use catalog::{CatalogEntry, CatalogStore, SqliteCatalog};
pub use config::{parse_interval, ShareConfig};
pub use download::{DownloadGateway, DownloadRequest, DownloadResponse};
pub use error::{ApkFinderError, Result};
pub use models::{BuildClassification, DirectoryMeta, FileRecord, FileStat, SearchPage};
pub use scanner::{ScanReport, Scanner, Scheduler};
pub use search::{BuildFilter, SearchQuery};
pub use share::{ByteStream, RetryConfig, ShareBackend, ShareManager};

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};

use models::normalize_share_path;

/// Main API struct for APK Finder operations.
///
/// Owns the catalog, the share connections, the scanner, the download
/// gateway and the background scheduler. Cheap to share behind an `Arc`.
pub struct ApkFinder {
    data_dir: PathBuf,
    catalog: Arc<dyn CatalogStore>,
    shares: Arc<ShareManager>,
    scanner: Arc<Scanner>,
    gateway: DownloadGateway,
    scheduler: Scheduler,
}

impl ApkFinder {
    /// Create a builder for ApkFinder.
    pub fn builder(data_dir: impl Into<PathBuf>) -> ApkFinderBuilder {
        ApkFinderBuilder::new(data_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn shares(&self) -> &Arc<ShareManager> {
        &self.shares
    }

    pub fn scanner(&self) -> &Arc<Scanner> {
        &self.scanner
    }

    /// Start the periodic scan (first run immediately) and scratch cleanup.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Stop the background tasks.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Scan every share now and wait for it.
    ///
    /// Returns `None` if a scan was already running.
    pub async fn scan_now(&self) -> Option<ScanReport> {
        self.scanner.scan_all().await
    }

    fn check_share(&self, share: &str) -> Result<()> {
        if self.shares.contains(share) {
            Ok(())
        } else {
            Err(ApkFinderError::UnknownShare(share.to_string()))
        }
    }

    // ========================================
    // Search
    // ========================================

    pub fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        if let Some(share) = &query.share {
            self.check_share(share)?;
        }
        search::search(self.catalog.as_ref(), query)
    }

    // ========================================
    // Scanning
    // ========================================

    /// Force a rescan of one share, or all, in the background.
    ///
    /// Returns as soon as the scan is scheduled. Unknown shares are rejected
    /// before anything is spawned.
    pub fn refresh(&self, share: Option<&str>) -> Result<String> {
        if let Some(id) = share {
            self.check_share(id)?;
        }

        let scanner = self.scanner.clone();
        let scope = share.map(str::to_string);
        tokio::spawn(async move {
            if let Err(e) = scanner.force_scan(scope.as_deref()).await {
                error!("Forced scan failed: {}", e);
            }
        });

        Ok(match share {
            Some(id) => format!("Refresh started for {}", id),
            None => "Refresh started for all servers".to_string(),
        })
    }

    // ========================================
    // Downloads and file metadata
    // ========================================

    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadResponse> {
        self.gateway.resolve_download(request).await
    }

    /// Live metadata of one file, plus its MD5 when a download recorded one.
    pub async fn file_info(&self, share: &str, path: &str) -> Result<FileInfo> {
        let path = normalize_share_path(path)?;
        let client = self.shares.get(share).await?;

        let stat = client.stat_file(&path).await?;
        if !stat.exists {
            return Err(ApkFinderError::FileNotFound(path));
        }
        let size = client.resolve_size(&path, &stat).await;

        let md5 = match self.catalog.find_file(share, &path) {
            Ok(record) => record.and_then(|r| r.content_hash),
            Err(e) => {
                warn!("Catalog lookup for {}:{} failed: {}", share, path, e);
                None
            }
        };

        Ok(FileInfo {
            path,
            size,
            modified_time: stat.modified_time,
            md5,
            exists: true,
        })
    }

    // ========================================
    // Status
    // ========================================

    /// Catalog and scanner snapshot.
    ///
    /// A failing catalog does not fail the call; it is reported through
    /// `store_status`.
    pub fn status(&self) -> SystemStatus {
        let mut servers_status: BTreeMap<String, ServerStatus> = self
            .shares
            .configs()
            .iter()
            .map(|c| (c.id.clone(), ServerStatus::default()))
            .collect();

        let store_status = match self.catalog.list_entries(None) {
            Ok(entries) => {
                for entry in entries {
                    let Some(status) = servers_status.get_mut(&entry.share) else {
                        continue;
                    };
                    status.files_count += entry.files.len();
                    status.directories += 1;
                    if status.last_scan.map_or(true, |t| entry.updated_at > t) {
                        status.last_scan = Some(entry.updated_at);
                    }
                }
                "connected"
            }
            Err(e) => {
                error!("Failed to read catalog for status: {}", e);
                "disconnected"
            }
        };

        let total_files = servers_status.values().map(|s| s.files_count).sum();
        let last_scan_time = self
            .scanner
            .last_scan_time()
            .or_else(|| servers_status.values().filter_map(|s| s.last_scan).max());

        SystemStatus {
            last_scan_time,
            next_scan_time: self.scheduler.next_scan_time(),
            total_files,
            scanning: self.scanner.is_scanning(),
            servers_status,
            store_status: store_status.to_string(),
        }
    }

    pub fn health(&self) -> HealthReport {
        let scanner = if self.scheduler.is_running() {
            "running"
        } else {
            "stopped"
        }
        .to_string();

        match self.catalog.ping() {
            Ok(()) => HealthReport {
                status: "healthy".to_string(),
                timestamp: Utc::now(),
                services: ServiceHealth {
                    catalog: "connected".to_string(),
                    scanner,
                },
                error: None,
            },
            Err(e) => {
                warn!("Health check failed: {}", e);
                HealthReport {
                    status: "unhealthy".to_string(),
                    timestamp: Utc::now(),
                    services: ServiceHealth {
                        catalog: "disconnected".to_string(),
                        scanner,
                    },
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Configured shares, without credentials.
    pub fn servers(&self) -> Vec<ShareSummary> {
        self.shares
            .configs()
            .iter()
            .map(|c| ShareSummary {
                name: c.id.clone(),
                display_name: c.display_name.clone(),
                path: c.path.clone(),
            })
            .collect()
    }
}
