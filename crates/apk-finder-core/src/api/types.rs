//! Response types of the facade.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Metadata of one file on a share.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: String,
    /// `None` when the share reports no usable size.
    pub size: Option<u64>,
    pub modified_time: Option<DateTime<Utc>>,
    /// MD5 recorded by a previous full download, if any.
    pub md5: Option<String>,
    pub exists: bool,
}

/// Per-share part of [`SystemStatus`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerStatus {
    pub files_count: usize,
    pub directories: usize,
    pub last_scan: Option<DateTime<Utc>>,
}

/// Snapshot of the scanner and catalog.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub last_scan_time: Option<DateTime<Utc>>,
    pub next_scan_time: Option<DateTime<Utc>>,
    pub total_files: usize,
    pub scanning: bool,
    pub servers_status: BTreeMap<String, ServerStatus>,
    /// `connected` or `disconnected`.
    pub store_status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub catalog: String,
    pub scanner: String,
}

/// Liveness report for `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `healthy` or `unhealthy`.
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub services: ServiceHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Public description of a configured share.
#[derive(Debug, Clone, Serialize)]
pub struct ShareSummary {
    pub name: String,
    pub display_name: String,
    pub path: String,
}
