//! Builder for configuring ApkFinder initialization.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{CatalogStore, SqliteCatalog};
use crate::config::{PathsConfig, ScanConfig, ShareConfig};
use crate::download::DownloadGateway;
use crate::error::{ApkFinderError, Result};
use crate::scanner::{Scanner, Scheduler};
use crate::share::{BackendFactory, RetryConfig, ShareManager};
use crate::ApkFinder;

/// Builder for configuring ApkFinder initialization.
///
/// # Example
///
/// ```rust,ignore
/// use apk_finder_core::{ApkFinder, ShareConfig};
///
/// let finder = ApkFinder::builder("./data")
///     .shares(ShareConfig::from_env())
///     .update_interval(Duration::from_secs(300))
///     .build()?;
/// finder.start();
/// ```
pub struct ApkFinderBuilder {
    data_dir: PathBuf,
    shares: Vec<ShareConfig>,
    backend_factory: Option<BackendFactory>,
    retry: Option<RetryConfig>,
    update_interval: Duration,
    clean_interval: Duration,
    in_memory_catalog: bool,
}

impl ApkFinderBuilder {
    /// Create a new builder with the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            shares: Vec::new(),
            backend_factory: None,
            retry: None,
            update_interval: ScanConfig::DEFAULT_UPDATE_INTERVAL,
            clean_interval: ScanConfig::DEFAULT_TEMP_CLEAN_INTERVAL,
            in_memory_catalog: false,
        }
    }

    /// Shares to index. Ids must be unique.
    pub fn shares(mut self, shares: Vec<ShareConfig>) -> Self {
        self.shares = shares;
        self
    }

    /// Replace the mounted-share backend, e.g. with the mock backend in tests.
    ///
    /// Default: [`MountedBackend`](crate::share::MountedBackend)
    pub fn backend_factory(mut self, factory: BackendFactory) -> Self {
        self.backend_factory = Some(factory);
        self
    }

    /// Contention retry policy for share reads.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Period of the background full scan.
    ///
    /// Default: 5 minutes
    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Period of the scratch-directory cleanup.
    ///
    /// Default: 30 minutes
    pub fn clean_interval(mut self, interval: Duration) -> Self {
        self.clean_interval = interval;
        self
    }

    /// Keep the catalog in memory instead of `<data_dir>/catalog.sqlite`.
    ///
    /// Default: `false`
    pub fn in_memory_catalog(mut self, enable: bool) -> Self {
        self.in_memory_catalog = enable;
        self
    }

    fn validate_shares(shares: &[ShareConfig]) -> Result<()> {
        let mut seen = HashSet::new();
        for share in shares {
            if share.id.trim().is_empty() {
                return Err(ApkFinderError::Config {
                    message: "share id must not be empty".to_string(),
                });
            }
            if !seen.insert(share.id.as_str()) {
                return Err(ApkFinderError::Config {
                    message: format!("duplicate share id: {}", share.id),
                });
            }
        }
        Ok(())
    }

    /// Build the ApkFinder instance. Background tasks are not started.
    pub fn build(self) -> Result<ApkFinder> {
        Self::validate_shares(&self.shares)?;

        std::fs::create_dir_all(&self.data_dir).map_err(|e| ApkFinderError::Io {
            message: format!("Failed to create data directory: {}", self.data_dir.display()),
            path: Some(self.data_dir.clone()),
            source: Some(e),
        })?;

        let catalog: Arc<dyn CatalogStore> = if self.in_memory_catalog {
            Arc::new(SqliteCatalog::open_in_memory()?)
        } else {
            Arc::new(SqliteCatalog::open(
                self.data_dir.join(PathsConfig::CATALOG_DB_NAME),
            )?)
        };

        let scratch_dir = self.data_dir.join(PathsConfig::SCRATCH_DIR_NAME);
        let mut shares = match self.backend_factory {
            Some(factory) => ShareManager::with_factory(self.shares, &scratch_dir, factory),
            None => ShareManager::mounted(self.shares, &scratch_dir),
        };
        if let Some(retry) = self.retry {
            shares = shares.with_retry(retry);
        }
        let shares = Arc::new(shares);

        let scanner = Arc::new(Scanner::new(catalog.clone(), shares.clone()));
        let gateway = DownloadGateway::new(catalog.clone(), shares.clone());
        let scheduler = Scheduler::new(
            scanner.clone(),
            scratch_dir,
            self.update_interval,
            self.clean_interval,
        );

        tracing::info!(
            "APK Finder initialized with {} shares, data in {}",
            shares.configs().len(),
            self.data_dir.display()
        );

        Ok(ApkFinder {
            data_dir: self.data_dir,
            catalog,
            shares,
            scanner,
            gateway,
            scheduler,
        })
    }
}
