//! Incremental share scanner.
//!
//! Every top-level directory of a share is one catalog bucket. A bucket is
//! only walked when its immediate subdirectory count differs from the cached
//! count (or the cached count is the force-rescan sentinel). Replacing a
//! file in place without adding or removing a subdirectory therefore goes
//! unnoticed until a force scan.

mod cleanup;
mod scheduler;

pub use cleanup::clean_scratch_dir;
pub use scheduler::Scheduler;

use crate::catalog::CatalogStore;
use crate::config::ShareConfig;
use crate::error::{ApkFinderError, Result};
use crate::models::{is_apk_file, join_share_path, DirectoryMeta, FileRecord};
use crate::share::{ShareClient, ShareManager};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Summary of one scan run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub shares_scanned: usize,
    pub shares_failed: usize,
    pub directories_scanned: usize,
    pub directories_skipped: usize,
    pub directories_failed: usize,
    pub directories_removed: usize,
    pub files_indexed: usize,
}

enum DirectoryOutcome {
    Skipped,
    Indexed(usize),
}

/// Resets the scan-in-progress flag when dropped.
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Walks configured shares and refreshes the catalog.
pub struct Scanner {
    catalog: Arc<dyn CatalogStore>,
    shares: Arc<ShareManager>,
    scanning: AtomicBool,
    last_scan_time: Mutex<Option<DateTime<Utc>>>,
}

impl Scanner {
    pub fn new(catalog: Arc<dyn CatalogStore>, shares: Arc<ShareManager>) -> Self {
        Self {
            catalog,
            shares,
            scanning: AtomicBool::new(false),
            last_scan_time: Mutex::new(None),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Completion time of the last finished scan.
    pub fn last_scan_time(&self) -> Option<DateTime<Utc>> {
        *self.last_scan_time.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_begin(&self) -> Option<ScanGuard<'_>> {
        self.scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ScanGuard(&self.scanning))
    }

    fn finish(&self, report: &ScanReport) {
        *self.last_scan_time.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        info!(
            "Scan finished: {} shares ({} failed), {} directories scanned, {} unchanged, {} removed, {} files indexed",
            report.shares_scanned,
            report.shares_failed,
            report.directories_scanned,
            report.directories_skipped,
            report.directories_removed,
            report.files_indexed
        );
    }

    /// Scan every configured share.
    ///
    /// Returns `None` without doing anything if a scan is already running.
    pub async fn scan_all(&self) -> Option<ScanReport> {
        let Some(_guard) = self.try_begin() else {
            info!("Scan already in progress, skipping");
            return None;
        };

        info!("Starting scan of {} shares", self.shares.configs().len());
        let mut report = ScanReport::default();
        for config in self.shares.configs() {
            self.scan_share_inner(config, &mut report).await;
        }

        self.finish(&report);
        Some(report)
    }

    /// Scan one share.
    pub async fn scan_share(&self, share_id: &str) -> Result<Option<ScanReport>> {
        let config = self
            .shares
            .config(share_id)
            .ok_or_else(|| ApkFinderError::UnknownShare(share_id.to_string()))?;

        let Some(_guard) = self.try_begin() else {
            info!("Scan already in progress, skipping scan of {}", share_id);
            return Ok(None);
        };

        let mut report = ScanReport::default();
        self.scan_share_inner(config, &mut report).await;
        self.finish(&report);
        Ok(Some(report))
    }

    /// Reset change detection for one share (or all) and scan.
    ///
    /// The reset applies even when another scan is running, so the next
    /// cycle performs the full walk.
    pub async fn force_scan(&self, share_id: Option<&str>) -> Result<Option<ScanReport>> {
        if let Some(id) = share_id {
            if !self.shares.contains(id) {
                return Err(ApkFinderError::UnknownShare(id.to_string()));
            }
        }

        let reset = self.catalog.reset_meta(share_id)?;
        info!(
            "Force scan requested for {}: {} directories reset",
            share_id.unwrap_or("all shares"),
            reset
        );

        match share_id {
            Some(id) => self.scan_share(id).await,
            None => Ok(self.scan_all().await),
        }
    }

    async fn scan_share_inner(&self, config: &ShareConfig, report: &mut ScanReport) {
        let share_id = config.id.as_str();

        let client = match self.shares.get(share_id).await {
            Ok(client) => client,
            Err(e) => {
                error!("Skipping share {}: {}", share_id, e);
                report.shares_failed += 1;
                return;
            }
        };

        let top_level = match client.list_directories("/").await {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to list share {}: {}", share_id, e);
                report.shares_failed += 1;
                self.shares.invalidate(share_id).await;
                return;
            }
        };

        for directory in &top_level {
            match self.scan_directory(&client, directory).await {
                Ok(DirectoryOutcome::Skipped) => report.directories_skipped += 1,
                Ok(DirectoryOutcome::Indexed(count)) => {
                    report.directories_scanned += 1;
                    report.files_indexed += count;
                }
                Err(e) => {
                    error!("Failed to scan {}:/{}: {}", share_id, directory, e);
                    report.directories_failed += 1;
                }
            }
        }

        report.directories_removed += self.prune_vanished(share_id, &top_level);
        report.shares_scanned += 1;
    }

    /// Drop buckets whose top-level directory no longer exists on the share.
    fn prune_vanished(&self, share_id: &str, top_level: &[String]) -> usize {
        let present: HashSet<&str> = top_level.iter().map(String::as_str).collect();
        let known = match self.catalog.list_directories(share_id) {
            Ok(known) => known,
            Err(e) => {
                warn!("Could not list catalog directories for {}: {}", share_id, e);
                return 0;
            }
        };

        let mut removed = 0;
        for directory in known.iter().filter(|d| !present.contains(d.as_str())) {
            match self.catalog.remove_directory(share_id, directory) {
                Ok(true) => {
                    info!("Removed vanished directory {}:/{}", share_id, directory);
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to remove {}:/{}: {}", share_id, directory, e),
            }
        }
        removed
    }

    async fn scan_directory(
        &self,
        client: &ShareClient,
        directory: &str,
    ) -> Result<DirectoryOutcome> {
        let share_id = client.id();
        let path = join_share_path("/", directory);

        let subdirectory_count = client.list_directories(&path).await?.len() as i64;
        let cached = self.catalog.get_meta(share_id, directory)?;

        if let Some(meta) = &cached {
            if !meta.is_force_rescan() && meta.subdirectory_count == subdirectory_count {
                debug!(
                    "{}:{} unchanged ({} subdirectories), skipping",
                    share_id, path, subdirectory_count
                );
                return Ok(DirectoryOutcome::Skipped);
            }
        }

        debug!(
            "{}:{} changed ({:?} -> {} subdirectories), walking",
            share_id,
            path,
            cached.map(|m| m.subdirectory_count),
            subdirectory_count
        );

        let records = collect_apks(client, &path).await?;
        let file_count = records.len();

        self.catalog.set_files(share_id, directory, records)?;
        self.catalog.set_meta(
            share_id,
            directory,
            &DirectoryMeta {
                subdirectory_count,
                last_scan_time: Some(Utc::now()),
                file_count: file_count as u64,
            },
        )?;

        info!("Indexed {} APKs under {}:{}", file_count, share_id, path);
        Ok(DirectoryOutcome::Indexed(file_count))
    }
}

/// Depth-first walk of `root`, collecting every `.apk` file.
///
/// A subdirectory that cannot be listed is logged and skipped; failing to
/// list `root` itself is an error.
async fn collect_apks(client: &ShareClient, root: &str) -> Result<Vec<FileRecord>> {
    let share_prefix = client.config().path.clone();
    let mut records = Vec::new();
    let mut stack = vec![root.to_string()];

    while let Some(dir) = stack.pop() {
        let entries = match client.list_entries(&dir).await {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(e),
            Err(e) => {
                warn!("Skipping unreadable directory {}:{}: {}", client.id(), dir, e);
                continue;
            }
        };

        for entry in entries {
            let full_path = join_share_path(&dir, &entry.name);
            if entry.is_dir() {
                stack.push(full_path);
                continue;
            }
            if !is_apk_file(&entry.name) {
                continue;
            }

            let attributes = match (entry.size, entry.created_time) {
                (Some(size), Some(created)) => Some((size, created)),
                _ => stat_attributes(client, &full_path).await,
            };

            match attributes {
                Some((size, created)) => records.push(FileRecord::discovered(
                    full_path,
                    size,
                    created,
                    &share_prefix,
                )),
                None => warn!(
                    "Skipping {}:{}: size or creation time unavailable",
                    client.id(),
                    full_path
                ),
            }
        }
    }

    records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(records)
}

async fn stat_attributes(client: &ShareClient, path: &str) -> Option<(u64, DateTime<Utc>)> {
    match client.stat_file(path).await {
        Ok(stat) if stat.exists => {
            let created = stat.created_time.or(stat.modified_time)?;
            Some((stat.size?, created))
        }
        Ok(_) => None,
        Err(e) => {
            warn!("Stat failed for {}:{}: {}", client.id(), path, e);
            None
        }
    }
}
