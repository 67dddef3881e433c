//! Catalog data model.
//!
//! Share paths are always `/`-separated and share-rooted (`/AppA/app.apk`).
//! Input paths using `\` separators are normalised on the way in.

use crate::config::ScanConfig;
use crate::error::{ApkFinderError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Build type derived from the file's share-relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildClassification {
    Release,
    Debug,
    Unknown,
}

impl BuildClassification {
    /// Classify by case-insensitive substring: `release` wins over `debug`.
    pub fn classify(path: &str) -> Self {
        let lower = path.to_lowercase();
        if lower.contains("release") {
            BuildClassification::Release
        } else if lower.contains("debug") {
            BuildClassification::Debug
        } else {
            BuildClassification::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildClassification::Release => "release",
            BuildClassification::Debug => "debug",
            BuildClassification::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BuildClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One indexed APK file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub relative_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub created_time: DateTime<Utc>,
    pub share_prefix: String,
    pub build_classification: BuildClassification,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub content_hash: Option<String>,
}

impl FileRecord {
    /// Build a fresh record as discovered by a scan.
    pub fn discovered(
        relative_path: String,
        file_size: u64,
        created_time: DateTime<Utc>,
        share_prefix: &str,
    ) -> Self {
        let file_name = file_name_of(&relative_path).to_string();
        let build_classification = BuildClassification::classify(&relative_path);
        Self {
            relative_path,
            file_name,
            file_size,
            created_time,
            share_prefix: share_prefix.to_string(),
            build_classification,
            download_count: 0,
            content_hash: None,
        }
    }

    /// Reject records that could not have come from a scan.
    pub fn validate(&self) -> Result<()> {
        if !self.relative_path.starts_with('/') || self.file_name.is_empty() {
            return Err(ApkFinderError::Validation {
                field: "relative_path".to_string(),
                message: format!("not a share-rooted file path: {:?}", self.relative_path),
            });
        }
        if file_name_of(&self.relative_path) != self.file_name {
            return Err(ApkFinderError::Validation {
                field: "file_name".to_string(),
                message: format!(
                    "{:?} is not the last segment of {:?}",
                    self.file_name, self.relative_path
                ),
            });
        }
        Ok(())
    }
}

/// Scan bookkeeping for one top-level directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryMeta {
    pub subdirectory_count: i64,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub file_count: u64,
}

impl DirectoryMeta {
    pub fn is_force_rescan(&self) -> bool {
        self.subdirectory_count == ScanConfig::FORCE_RESCAN_SENTINEL
    }
}

/// Kind of a directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One entry of a remote directory listing.
///
/// Attributes are optional because not every listing carries them; the
/// scanner falls back to a per-file stat when they are missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
    pub created_time: Option<DateTime<Utc>>,
}

impl ShareEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Result of a remote stat.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileStat {
    pub exists: bool,
    pub size: Option<u64>,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: Option<DateTime<Utc>>,
}

impl FileStat {
    pub fn missing() -> Self {
        Self::default()
    }

    /// Size when it is usable for range arithmetic (zero counts as unknown).
    pub fn known_size(&self) -> Option<u64> {
        self.size.filter(|s| *s > 0)
    }
}

/// A page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub total: usize,
    pub items: Vec<FileRecord>,
    pub limit: usize,
    pub offset: usize,
}

/// Normalise a user- or protocol-supplied path into `/a/b/c` form.
///
/// The share root is `/`. Empty and `.` segments are dropped; `..` is
/// rejected so a path can never escape the share.
pub fn normalize_share_path(raw: &str) -> Result<String> {
    let mut segments = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(ApkFinderError::Validation {
                    field: "path".to_string(),
                    message: format!("parent segments are not allowed: {:?}", raw),
                })
            }
            s => segments.push(s),
        }
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Append one name to a normalised share path.
pub fn join_share_path(parent: &str, name: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Last segment of a share path.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Catalog bucket a file belongs to: its top-level directory.
///
/// Files directly under the share root have no bucket and are never indexed.
pub fn top_level_directory(path: &str) -> Option<&str> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let first = segments.next()?;
    segments.next().map(|_| first)
}

/// True for names ending in `.apk`, any case.
pub fn is_apk_file(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ScanConfig::APK_EXTENSION))
}

impl FromStr for BuildClassification {
    type Err = ApkFinderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "release" => Ok(BuildClassification::Release),
            "debug" => Ok(BuildClassification::Debug),
            "unknown" => Ok(BuildClassification::Unknown),
            other => Err(ApkFinderError::Validation {
                field: "build_classification".to_string(),
                message: format!("unknown build classification: {}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            BuildClassification::classify("/AppA/app-Release.apk"),
            BuildClassification::Release
        );
        assert_eq!(
            BuildClassification::classify("/AppA/debug/app.apk"),
            BuildClassification::Debug
        );
        assert_eq!(
            BuildClassification::classify("/AppA/app.apk"),
            BuildClassification::Unknown
        );
        // release takes precedence
        assert_eq!(
            BuildClassification::classify("/debug/app-release.apk"),
            BuildClassification::Release
        );
    }

    #[test]
    fn test_normalize_share_path() {
        assert_eq!(
            normalize_share_path(r"\AppA\release\app.apk").unwrap(),
            "/AppA/release/app.apk"
        );
        assert_eq!(normalize_share_path("AppA//x.apk").unwrap(), "/AppA/x.apk");
        assert_eq!(normalize_share_path("").unwrap(), "/");
        assert!(normalize_share_path("/AppA/../../etc/passwd").is_err());
    }

    #[test]
    fn test_top_level_directory() {
        assert_eq!(top_level_directory("/AppA/release/a.apk"), Some("AppA"));
        assert_eq!(top_level_directory("/AppA/a.apk"), Some("AppA"));
        assert_eq!(top_level_directory("/a.apk"), None);
        assert_eq!(top_level_directory("/"), None);
    }

    #[test]
    fn test_is_apk_file() {
        assert!(is_apk_file("app.apk"));
        assert!(is_apk_file("APP.APK"));
        assert!(!is_apk_file("app.apk.txt"));
        assert!(!is_apk_file("apk"));
    }

    #[test]
    fn test_record_validation() {
        let record = FileRecord::discovered(
            "/AppA/release/app-release.apk".to_string(),
            10,
            Utc::now(),
            r"\\host\share",
        );
        assert_eq!(record.file_name, "app-release.apk");
        assert_eq!(record.build_classification, BuildClassification::Release);
        assert!(record.validate().is_ok());

        let mut broken = record.clone();
        broken.file_name = "other.apk".to_string();
        assert!(broken.validate().is_err());
    }
}
