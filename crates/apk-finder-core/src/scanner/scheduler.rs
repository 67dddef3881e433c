//! Background scan and cleanup tasks.

use super::cleanup::clean_scratch_dir;
use super::Scanner;
use crate::config::ScanConfig;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Runs the periodic full scan and the scratch cleanup.
///
/// The first scan runs as soon as the scheduler starts. A tick that fires
/// while the previous scan is still running is skipped by the scanner.
pub struct Scheduler {
    scanner: Arc<Scanner>,
    scratch_dir: PathBuf,
    update_interval: Duration,
    clean_interval: Duration,
    next_scan: Arc<Mutex<Option<DateTime<Utc>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        scanner: Arc<Scanner>,
        scratch_dir: PathBuf,
        update_interval: Duration,
        clean_interval: Duration,
    ) -> Self {
        Self {
            scanner,
            scratch_dir,
            update_interval: update_interval.max(Duration::from_secs(1)),
            clean_interval: clean_interval.max(Duration::from_secs(1)),
            next_scan: Arc::new(Mutex::new(None)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn is_running(&self) -> bool {
        !self.tasks().is_empty()
    }

    /// When the next periodic scan is due.
    pub fn next_scan_time(&self) -> Option<DateTime<Utc>> {
        *self.next_scan.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the background tasks. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks();
        if !tasks.is_empty() {
            return;
        }

        info!(
            "Starting scheduler: scan every {:?}, cleanup every {:?}",
            self.update_interval, self.clean_interval
        );

        let scanner = self.scanner.clone();
        let next_scan = self.next_scan.clone();
        let update_interval = self.update_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(update_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let step = chrono::Duration::from_std(update_interval).unwrap_or_default();

            loop {
                ticker.tick().await;
                *next_scan.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now() + step);
                scanner.scan_all().await;
            }
        }));

        let scratch_dir = self.scratch_dir.clone();
        let clean_interval = self.clean_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(clean_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let Err(e) =
                    clean_scratch_dir(&scratch_dir, ScanConfig::TEMP_FILE_MAX_AGE).await
                {
                    warn!("Scratch cleanup failed: {}", e);
                }
            }
        }));
    }

    /// Abort the background tasks.
    pub fn stop(&self) {
        let mut tasks = self.tasks();
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            task.abort();
        }
        *self.next_scan.lock().unwrap_or_else(|e| e.into_inner()) = None;
        info!("Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::config::ShareConfig;
    use crate::share::{MockBackend, ShareBackend, ShareManager};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_initial_scan_and_stop() {
        let scratch = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new("server_1"));
        mock.add_file("/AppA/a.apk", vec![0u8; 4], Utc::now());
        let backend = mock.clone();
        let shares = ShareManager::with_factory(
            vec![ShareConfig {
                id: "server_1".to_string(),
                path: r"\\host\builds".to_string(),
                display_name: "Server 1".to_string(),
                mount: None,
            }],
            scratch.path(),
            Arc::new(move |_: &ShareConfig| backend.clone() as Arc<dyn ShareBackend>),
        );
        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
        let scanner = Arc::new(Scanner::new(catalog, Arc::new(shares)));

        let scheduler = Scheduler::new(
            scanner.clone(),
            scratch.path().to_path_buf(),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        );
        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        for _ in 0..100 {
            if scanner.last_scan_time().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(scanner.last_scan_time().is_some());
        assert!(scheduler.next_scan_time().is_some());

        scheduler.stop();
        assert!(!scheduler.is_running());
        assert!(scheduler.next_scan_time().is_none());
    }
}
