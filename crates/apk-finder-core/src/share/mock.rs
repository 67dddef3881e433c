//! In-memory share backend for tests.
//!
//! Holds a small file tree in memory, counts every call and can inject the
//! failure modes seen on real shares: busy files, permanently locked files,
//! listings without attributes, zero-size stats, sizes that cannot be probed
//! and broken ranged reads.

use super::stream::{reader_stream, ByteStream};
use super::{ByteRange, ShareBackend};
use crate::config::NetworkConfig;
use crate::error::{ApkFinderError, Result};
use crate::models::{file_name_of, EntryKind, FileStat, ShareEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Call counters for a [`MockBackend`].
#[derive(Debug, Default)]
pub struct MockCalls {
    connect: AtomicUsize,
    list_directories: AtomicUsize,
    list_entries: AtomicUsize,
    stat: AtomicUsize,
    probe_size: AtomicUsize,
    open_read: AtomicUsize,
    copy_to_local: AtomicUsize,
}

impl MockCalls {
    pub fn connect(&self) -> usize {
        self.connect.load(Ordering::SeqCst)
    }

    pub fn list_directories(&self) -> usize {
        self.list_directories.load(Ordering::SeqCst)
    }

    /// Deep listing calls made by the recursive walk.
    pub fn list_entries(&self) -> usize {
        self.list_entries.load(Ordering::SeqCst)
    }

    pub fn stat(&self) -> usize {
        self.stat.load(Ordering::SeqCst)
    }

    pub fn probe_size(&self) -> usize {
        self.probe_size.load(Ordering::SeqCst)
    }

    pub fn open_read(&self) -> usize {
        self.open_read.load(Ordering::SeqCst)
    }

    pub fn copy_to_local(&self) -> usize {
        self.copy_to_local.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        for counter in [
            &self.connect,
            &self.list_directories,
            &self.list_entries,
            &self.stat,
            &self.probe_size,
            &self.open_read,
            &self.copy_to_local,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Clone)]
struct MockFile {
    data: Vec<u8>,
    created: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<String, MockFile>,
    dirs: BTreeSet<String>,
    busy_opens: HashMap<String, u32>,
    locked: HashSet<String>,
    zero_stat: HashSet<String>,
    unknown_size: HashSet<String>,
    broken_ranges: HashSet<String>,
    hide_attributes: bool,
    unavailable: bool,
}

fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

impl MockState {
    fn add_dir_chain(&mut self, dir: &str) {
        let mut current = dir.to_string();
        while current != "/" && !current.is_empty() {
            let parent = parent_of(&current).to_string();
            self.dirs.insert(current);
            current = parent;
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        path == "/" || self.dirs.contains(path)
    }

    fn file(&self, path: &str) -> Result<&MockFile> {
        self.files
            .get(path)
            .ok_or_else(|| ApkFinderError::FileNotFound(path.to_string()))
    }
}

/// Share backend over an in-memory file tree.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    state: Mutex<MockState>,
    calls: MockCalls,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(MockState::default()),
            calls: MockCalls::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> &MockCalls {
        &self.calls
    }

    /// Add or replace a file, creating its parent directories.
    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>, created: DateTime<Utc>) {
        let mut state = self.state();
        state.add_dir_chain(parent_of(path));
        state.files.insert(
            path.to_string(),
            MockFile {
                data: data.into(),
                created,
            },
        );
    }

    pub fn add_dir(&self, path: &str) {
        self.state().add_dir_chain(path);
    }

    pub fn remove_file(&self, path: &str) {
        self.state().files.remove(path);
    }

    /// Remove a directory and everything below it.
    pub fn remove_dir(&self, path: &str) {
        let prefix = format!("{}/", path);
        let mut state = self.state();
        state.dirs.retain(|d| d != path && !d.starts_with(&prefix));
        state.files.retain(|f, _| !f.starts_with(&prefix));
    }

    /// Fail the next `count` opens of `path` with a contention error.
    pub fn set_busy(&self, path: &str, count: u32) {
        self.state().busy_opens.insert(path.to_string(), count);
    }

    /// Fail every open of `path` with a contention error. Copies still work.
    pub fn set_locked(&self, path: &str, locked: bool) {
        let mut state = self.state();
        if locked {
            state.locked.insert(path.to_string());
        } else {
            state.locked.remove(path);
        }
    }

    /// Report size zero from `stat` for `path`, as some servers do.
    pub fn set_zero_stat(&self, path: &str) {
        self.state().zero_stat.insert(path.to_string());
    }

    /// Report size zero from `stat` and no size from the probe for `path`,
    /// so its size can only be learned by reading it.
    pub fn set_unknown_size(&self, path: &str) {
        let mut state = self.state();
        state.zero_stat.insert(path.to_string());
        state.unknown_size.insert(path.to_string());
    }

    /// Reject ranged opens of `path` that start past byte zero.
    pub fn set_broken_ranges(&self, path: &str) {
        self.state().broken_ranges.insert(path.to_string());
    }

    /// Leave size and creation time out of directory listings.
    pub fn set_hide_attributes(&self, hide: bool) {
        self.state().hide_attributes = hide;
    }

    /// Make `connect` fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    fn children(&self, path: &str) -> Result<Vec<ShareEntry>> {
        let state = self.state();
        if !state.is_dir(path) {
            return Err(ApkFinderError::FileNotFound(path.to_string()));
        }

        let mut entries: Vec<ShareEntry> = state
            .dirs
            .iter()
            .filter(|d| parent_of(d) == path)
            .map(|d| ShareEntry {
                name: file_name_of(d).to_string(),
                kind: EntryKind::Directory,
                size: None,
                created_time: None,
            })
            .collect();

        entries.extend(
            state
                .files
                .iter()
                .filter(|(f, _)| parent_of(f) == path)
                .map(|(f, file)| {
                    let (size, created_time) = if state.hide_attributes {
                        (None, None)
                    } else {
                        (Some(file.data.len() as u64), Some(file.created))
                    };
                    ShareEntry {
                        name: file_name_of(f).to_string(),
                        kind: EntryKind::File,
                        size,
                        created_time,
                    }
                }),
        );

        Ok(entries)
    }
}

#[async_trait]
impl ShareBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        self.calls.connect.fetch_add(1, Ordering::SeqCst);
        if self.state().unavailable {
            return Err(ApkFinderError::ShareUnavailable {
                share: self.name.clone(),
                message: "mock share is offline".to_string(),
            });
        }
        Ok(())
    }

    async fn list_entries(&self, path: &str) -> Result<Vec<ShareEntry>> {
        self.calls.list_entries.fetch_add(1, Ordering::SeqCst);
        self.children(path)
    }

    async fn list_directories(&self, path: &str) -> Result<Vec<String>> {
        self.calls.list_directories.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .children(path)?
            .into_iter()
            .filter(|e| e.is_dir())
            .map(|e| e.name)
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        self.calls.stat.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        let Some(file) = state.files.get(path) else {
            return Ok(FileStat::missing());
        };
        let size = if state.zero_stat.contains(path) {
            0
        } else {
            file.data.len() as u64
        };
        Ok(FileStat {
            exists: true,
            size: Some(size),
            created_time: Some(file.created),
            modified_time: Some(file.created),
        })
    }

    async fn probe_size(&self, path: &str) -> Result<Option<u64>> {
        self.calls.probe_size.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        let file = state.file(path)?;
        if state.unknown_size.contains(path) {
            return Ok(None);
        }
        Ok(Some(file.data.len() as u64))
    }

    async fn open_read(&self, path: &str, range: Option<ByteRange>) -> Result<ByteStream> {
        self.calls.open_read.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();

        if let Some(remaining) = state.busy_opens.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ApkFinderError::Contention {
                    path: path.to_string(),
                    message: "file is busy".to_string(),
                });
            }
        }
        if state.locked.contains(path) {
            return Err(ApkFinderError::Contention {
                path: path.to_string(),
                message: "file is locked".to_string(),
            });
        }
        if range.is_some_and(|r| r.start > 0) && state.broken_ranges.contains(path) {
            return Err(ApkFinderError::MalformedEntry {
                path: path.to_string(),
                message: "ranged read rejected".to_string(),
            });
        }

        let data = &state.file(path)?.data;
        let len = data.len() as u64;
        let (start, end) = match range {
            Some(r) => (
                r.start.min(len),
                r.end.map_or(len, |e| e.saturating_add(1).min(len)),
            ),
            None => (0, len),
        };
        let slice = data[start as usize..end.max(start) as usize].to_vec();

        Ok(reader_stream(
            std::io::Cursor::new(slice),
            None,
            NetworkConfig::READ_CHUNK_SIZE,
            NetworkConfig::READ_TIMEOUT,
            None,
        ))
    }

    async fn copy_to_local(&self, path: &str, dest: &Path) -> Result<u64> {
        self.calls.copy_to_local.fetch_add(1, Ordering::SeqCst);
        let data = self.state().file(path)?.data.clone();
        tokio::fs::write(dest, &data)
            .await
            .map_err(|e| ApkFinderError::io_with_path(e, dest))?;
        Ok(data.len() as u64)
    }
}
