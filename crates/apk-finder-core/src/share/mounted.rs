//! Share backend over the operating system's SMB client.
//!
//! Reads through a path the OS already resolves to the share: the UNC root
//! itself on Windows, or a CIFS mount point elsewhere. Filesystem calls are
//! blocking, so each one runs on the blocking pool under a timeout.

use super::stream::{reader_stream, ByteStream};
use super::{ByteRange, ShareBackend};
use crate::config::{NetworkConfig, ShareConfig};
use crate::error::{ApkFinderError, Result};
use crate::models::{EntryKind, FileStat, ShareEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncSeekExt;
use tracing::{debug, warn};

/// Backend reading a share through a locally resolvable root directory.
pub struct MountedBackend {
    name: String,
    root: PathBuf,
    metadata_timeout: Duration,
    read_timeout: Duration,
}

impl MountedBackend {
    pub fn new(config: &ShareConfig) -> Self {
        Self::with_root(&config.id, config.local_root())
    }

    pub fn with_root(name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            root: root.into(),
            metadata_timeout: NetworkConfig::METADATA_TIMEOUT,
            read_timeout: NetworkConfig::READ_TIMEOUT,
        }
    }

    /// Map a share path onto the local root. Paths arrive normalised, so
    /// every segment is a plain name.
    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    async fn run_blocking<T, F>(&self, timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ApkFinderError::Other(format!(
                "share task failed: {}",
                join_err
            ))),
            Err(_) => Err(ApkFinderError::Timeout(timeout)),
        }
    }
}

/// True for "file busy / locked by another process" errors.
pub(crate) fn is_contention_io(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    match err.raw_os_error() {
        // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        #[cfg(windows)]
        Some(32) | Some(33) => true,
        // EBUSY, ETXTBSY
        #[cfg(unix)]
        Some(16) | Some(26) => true,
        _ => false,
    }
}

/// Classify an IO error from the share.
fn classify_io(err: io::Error, share_path: &str) -> ApkFinderError {
    if err.kind() == io::ErrorKind::NotFound {
        ApkFinderError::FileNotFound(share_path.to_string())
    } else if is_contention_io(&err) {
        ApkFinderError::Contention {
            path: share_path.to_string(),
            message: err.to_string(),
        }
    } else {
        ApkFinderError::Io {
            message: format!("{}: {}", share_path, err),
            path: None,
            source: Some(err),
        }
    }
}

/// Creation time, falling back to the modification time on platforms that
/// don't record one.
fn created_of(meta: &Metadata) -> Option<DateTime<Utc>> {
    meta.created()
        .or_else(|_| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn entry_from(dir_entry: &std::fs::DirEntry) -> Option<ShareEntry> {
    let name = match dir_entry.file_name().into_string() {
        Ok(name) => name,
        Err(raw) => {
            warn!("Skipping entry with non UTF-8 name: {:?}", raw);
            return None;
        }
    };

    // Attributes come from the listing when the platform provides them;
    // otherwise they stay empty and the caller stats the file.
    let metadata = dir_entry.metadata().ok();
    let is_dir = match dir_entry.file_type() {
        Ok(ft) => ft.is_dir(),
        Err(_) => match &metadata {
            Some(m) => m.is_dir(),
            None => {
                warn!("Skipping {}: cannot determine entry type", name);
                return None;
            }
        },
    };

    let (size, created_time) = match (&metadata, is_dir) {
        (Some(m), false) => (Some(m.len()), created_of(m)),
        _ => (None, None),
    };

    Some(ShareEntry {
        name,
        kind: if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        size,
        created_time,
    })
}

#[async_trait]
impl ShareBackend for MountedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        let root = self.root.clone();
        let name = self.name.clone();
        self.run_blocking(NetworkConfig::CONNECT_TIMEOUT, move || {
            if cfg!(not(windows)) && root.to_string_lossy().starts_with(r"\\") {
                return Err(ApkFinderError::ShareUnavailable {
                    share: name,
                    message: format!(
                        "{} is a UNC path; mount the share and set its _MOUNT variable",
                        root.display()
                    ),
                });
            }
            let meta = std::fs::metadata(&root).map_err(|e| ApkFinderError::ShareUnavailable {
                share: name.clone(),
                message: format!("{}: {}", root.display(), e),
            })?;
            if !meta.is_dir() {
                return Err(ApkFinderError::ShareUnavailable {
                    share: name,
                    message: format!("{} is not a directory", root.display()),
                });
            }
            Ok(())
        })
        .await
    }

    async fn list_entries(&self, path: &str) -> Result<Vec<ShareEntry>> {
        let local = self.resolve(path);
        let share_path = path.to_string();
        self.run_blocking(self.metadata_timeout, move || {
            let read_dir =
                std::fs::read_dir(&local).map_err(|e| classify_io(e, &share_path))?;

            let mut entries = Vec::new();
            for item in read_dir {
                match item {
                    Ok(dir_entry) => entries.extend(entry_from(&dir_entry)),
                    Err(e) => warn!("Skipping unreadable entry in {}: {}", share_path, e),
                }
            }
            debug!("Listed {} entries in {}", entries.len(), share_path);
            Ok(entries)
        })
        .await
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let local = self.resolve(path);
        let share_path = path.to_string();
        self.run_blocking(self.metadata_timeout, move || {
            match std::fs::metadata(&local) {
                Ok(meta) if meta.is_file() => Ok(FileStat {
                    exists: true,
                    size: Some(meta.len()),
                    created_time: created_of(&meta),
                    modified_time: meta.modified().ok().map(DateTime::<Utc>::from),
                }),
                Ok(_) => Ok(FileStat::missing()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileStat::missing()),
                Err(e) => Err(classify_io(e, &share_path)),
            }
        })
        .await
    }

    async fn probe_size(&self, path: &str) -> Result<Option<u64>> {
        let local = self.resolve(path);
        let share_path = path.to_string();
        self.run_blocking(self.metadata_timeout, move || {
            let mut file =
                std::fs::File::open(&local).map_err(|e| classify_io(e, &share_path))?;
            let end = file
                .seek(SeekFrom::End(0))
                .map_err(|e| classify_io(e, &share_path))?;
            Ok(Some(end))
        })
        .await
    }

    async fn open_read(&self, path: &str, range: Option<ByteRange>) -> Result<ByteStream> {
        let local = self.resolve(path);

        let mut file = tokio::time::timeout(self.metadata_timeout, tokio::fs::File::open(&local))
            .await
            .map_err(|_| ApkFinderError::Timeout(self.metadata_timeout))?
            .map_err(|e| classify_io(e, path))?;

        let limit = match range {
            Some(range) => {
                if range.start > 0 {
                    file.seek(SeekFrom::Start(range.start))
                        .await
                        .map_err(|e| classify_io(e, path))?;
                }
                range.len()
            }
            None => None,
        };

        Ok(reader_stream(
            file,
            limit,
            NetworkConfig::READ_CHUNK_SIZE,
            self.read_timeout,
            None,
        ))
    }

    async fn copy_to_local(&self, path: &str, dest: &Path) -> Result<u64> {
        let local = self.resolve(path);
        let dest = dest.to_path_buf();
        let share_path = path.to_string();
        self.run_blocking(NetworkConfig::COPY_TIMEOUT, move || {
            std::fs::copy(&local, &dest).map_err(|e| classify_io(e, &share_path))
        })
        .await
    }
}
