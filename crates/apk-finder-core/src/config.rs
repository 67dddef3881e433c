//! Centralized configuration for APK Finder.
//!
//! Constants for remote share access, scanning, downloads and on-disk paths,
//! plus the static share configuration loaded once at startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Remote share access limits.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const METADATA_TIMEOUT: Duration = Duration::from_secs(30);
    pub const READ_TIMEOUT: Duration = Duration::from_secs(60);
    pub const CONTENTION_MAX_ATTEMPTS: u32 = 3;
    pub const CONTENTION_BASE_DELAY: Duration = Duration::from_millis(100);
    pub const CONTENTION_MAX_DELAY: Duration = Duration::from_secs(2);
    pub const READ_CHUNK_SIZE: usize = 64 * 1024;
    /// Whole-file copies of large APKs over a slow link.
    pub const COPY_TIMEOUT: Duration = Duration::from_secs(30 * 60);
}

/// Scanner and scheduler configuration.
pub struct ScanConfig;

impl ScanConfig {
    pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(300);
    pub const DEFAULT_TEMP_CLEAN_INTERVAL: Duration = Duration::from_secs(1800);
    pub const TEMP_FILE_MAX_AGE: Duration = Duration::from_secs(3600);
    /// Cached subdirectory count meaning "rescan regardless".
    pub const FORCE_RESCAN_SENTINEL: i64 = -1;
    pub const APK_EXTENSION: &'static str = "apk";
}

/// Download response configuration.
pub struct DownloadConfig;

impl DownloadConfig {
    pub const CONTENT_TYPE: &'static str = "application/vnd.android.package-archive";
    pub const FALLBACK_FILENAME: &'static str = "download.apk";
}

/// On-disk layout under the data directory.
pub struct PathsConfig;

impl PathsConfig {
    pub const CATALOG_DB_NAME: &'static str = "catalog.sqlite";
    pub const SCRATCH_DIR_NAME: &'static str = "tmp";
    pub const TEMP_FILE_PREFIX: &'static str = "apkf-";
}

/// One configured remote share.
///
/// Immutable after load. `path` is the UNC root (`\\host\share\sub`) and
/// doubles as the `share_prefix` stamped on every indexed record. There are
/// no credentials here: the OS session behind the mount (or the UNC path on
/// Windows) authenticates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    pub id: String,
    pub path: String,
    pub display_name: String,
    /// Local mount point of the share. When absent the UNC path is used
    /// directly, which only resolves on Windows.
    #[serde(default)]
    pub mount: Option<PathBuf>,
}

impl ShareConfig {
    /// Directory the mounted backend reads from.
    pub fn local_root(&self) -> PathBuf {
        match &self.mount {
            Some(mount) => mount.clone(),
            None => PathBuf::from(&self.path),
        }
    }

    /// True when the share is only reachable through its UNC path on a
    /// platform that cannot open UNC paths.
    pub fn needs_mount(&self) -> bool {
        self.mount.is_none() && !cfg!(windows)
    }

    /// Load shares from `FILE_SERVER_<n>` variables.
    ///
    /// Reads `FILE_SERVER_<n>`, `_NAME` and `_MOUNT`, starting at 1 and
    /// stopping at the first missing index. `_USER` and `_PASS` belong to
    /// the OS mount and are not read.
    pub fn from_env() -> Vec<ShareConfig> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Vec<ShareConfig> {
        let mut shares = Vec::new();
        let mut index = 1;

        while let Some(path) = lookup(&format!("FILE_SERVER_{}", index)).filter(|p| !p.is_empty())
        {
            let key = |suffix: &str| format!("FILE_SERVER_{}_{}", index, suffix);
            shares.push(ShareConfig {
                id: format!("server_{}", index),
                path,
                display_name: lookup(&key("NAME"))
                    .unwrap_or_else(|| format!("Server {}", index)),
                mount: lookup(&key("MOUNT"))
                    .filter(|m| !m.is_empty())
                    .map(PathBuf::from),
            });
            index += 1;
        }

        shares
    }
}

/// Parse an interval like `30s`, `5m`, `1h` or `2d`.
///
/// Anything unparseable falls back to the default scan interval.
pub fn parse_interval(value: &str) -> Duration {
    let value = value.trim();
    let Some(unit) = value.chars().last() else {
        return ScanConfig::DEFAULT_UPDATE_INTERVAL;
    };

    let Ok(amount) = value[..value.len() - unit.len_utf8()].parse::<u64>() else {
        return ScanConfig::DEFAULT_UPDATE_INTERVAL;
    };

    let seconds = match unit.to_ascii_lowercase() {
        's' => amount,
        'm' => amount * 60,
        'h' => amount * 3600,
        'd' => amount * 86_400,
        _ => return ScanConfig::DEFAULT_UPDATE_INTERVAL,
    };

    Duration::from_secs(seconds)
}
