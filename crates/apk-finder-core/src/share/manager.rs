//! Lazily connected clients for every configured share.

use super::client::ShareClient;
use super::mounted::MountedBackend;
use super::retry::RetryConfig;
use super::ShareBackend;
use crate::config::ShareConfig;
use crate::error::{ApkFinderError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Builds the backend for one share.
pub type BackendFactory = Arc<dyn Fn(&ShareConfig) -> Arc<dyn ShareBackend> + Send + Sync>;

/// Owns the configured shares and one cached client per connected share.
///
/// A failed connect is returned as [`ApkFinderError::ShareUnavailable`] and
/// not cached, so the next call tries again.
pub struct ShareManager {
    configs: Vec<ShareConfig>,
    factory: BackendFactory,
    scratch_dir: PathBuf,
    retry: RetryConfig,
    clients: RwLock<HashMap<String, ShareClient>>,
}

impl ShareManager {
    /// Manager backed by [`MountedBackend`] for every share.
    pub fn mounted(configs: Vec<ShareConfig>, scratch_dir: &Path) -> Self {
        Self::with_factory(
            configs,
            scratch_dir,
            Arc::new(|config: &ShareConfig| {
                Arc::new(MountedBackend::new(config)) as Arc<dyn ShareBackend>
            }),
        )
    }

    pub fn with_factory(
        configs: Vec<ShareConfig>,
        scratch_dir: &Path,
        factory: BackendFactory,
    ) -> Self {
        Self {
            configs,
            factory,
            scratch_dir: scratch_dir.to_path_buf(),
            retry: RetryConfig::contention(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Configured shares, in configuration order.
    pub fn configs(&self) -> &[ShareConfig] {
        &self.configs
    }

    pub fn config(&self, id: &str) -> Option<&ShareConfig> {
        self.configs.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.config(id).is_some()
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Client for share `id`, connecting on first use.
    pub async fn get(&self, id: &str) -> Result<ShareClient> {
        if let Some(client) = self.clients.read().await.get(id) {
            return Ok(client.clone());
        }

        let config = self
            .config(id)
            .ok_or_else(|| ApkFinderError::UnknownShare(id.to_string()))?;

        let backend = (self.factory)(config);
        if let Err(e) = backend.connect().await {
            warn!("Failed to connect to share {} ({}): {}", id, config.path, e);
            return Err(match e {
                ApkFinderError::ShareUnavailable { .. } => e,
                other => ApkFinderError::ShareUnavailable {
                    share: id.to_string(),
                    message: other.to_string(),
                },
            });
        }

        let client = ShareClient::new(config.clone(), backend, &self.scratch_dir)
            .with_retry(self.retry.clone());

        let mut clients = self.clients.write().await;
        let client = clients.entry(id.to_string()).or_insert_with(|| {
            info!("Connected to share {} ({})", id, config.path);
            client
        });
        Ok(client.clone())
    }

    /// Drop the cached client so the next call reconnects.
    pub async fn invalidate(&self, id: &str) {
        if self.clients.write().await.remove(id).is_some() {
            info!("Dropped cached connection to share {}", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::MockBackend;
    use tempfile::TempDir;

    fn config(id: &str) -> ShareConfig {
        ShareConfig {
            id: id.to_string(),
            path: format!(r"\\host\{}", id),
            display_name: id.to_string(),
            mount: None,
        }
    }

    fn manager_with(mock: Arc<MockBackend>, scratch: &Path) -> ShareManager {
        ShareManager::with_factory(
            vec![config("server_1")],
            scratch,
            Arc::new(move |_: &ShareConfig| mock.clone() as Arc<dyn ShareBackend>),
        )
    }

    #[tokio::test]
    async fn test_connects_once_and_caches() {
        let scratch = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new("server_1"));
        let manager = manager_with(mock.clone(), scratch.path());

        manager.get("server_1").await.unwrap();
        manager.get("server_1").await.unwrap();
        assert_eq!(mock.calls().connect(), 1);
    }

    #[tokio::test]
    async fn test_unknown_share() {
        let scratch = TempDir::new().unwrap();
        let manager = manager_with(Arc::new(MockBackend::new("server_1")), scratch.path());
        let err = manager.get("server_9").await.err().unwrap();
        assert!(matches!(err, ApkFinderError::UnknownShare(_)));
    }

    #[tokio::test]
    async fn test_failed_connect_is_not_cached() {
        let scratch = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new("server_1"));
        mock.set_unavailable(true);
        let manager = manager_with(mock.clone(), scratch.path());

        let err = manager.get("server_1").await.err().unwrap();
        assert!(matches!(err, ApkFinderError::ShareUnavailable { .. }));

        mock.set_unavailable(false);
        assert!(manager.get("server_1").await.is_ok());
        assert_eq!(mock.calls().connect(), 2);
    }
}
