//! Scratch directory cleanup.

use crate::error::{ApkFinderError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Delete files in `dir` last modified more than `max_age` ago.
///
/// Temporary copies normally delete themselves when their download ends;
/// this catches the ones left behind by a crash. A missing directory is
/// not an error. Returns the number of files removed.
pub async fn clean_scratch_dir(dir: &Path, max_age: Duration) -> Result<usize> {
    let dir: PathBuf = dir.to_path_buf();
    tokio::task::spawn_blocking(move || clean_blocking(&dir, max_age))
        .await
        .map_err(|e| ApkFinderError::Other(format!("cleanup task failed: {}", e)))?
}

fn clean_blocking(dir: &Path, max_age: Duration) -> Result<usize> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(ApkFinderError::io_with_path(e, dir)),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in read_dir.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed stale scratch file {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }

    if removed > 0 {
        info!("Cleaned {} stale files from {}", removed, dir.display());
    }
    Ok(removed)
}
