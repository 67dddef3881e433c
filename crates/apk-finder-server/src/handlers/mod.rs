//! HTTP handlers, split by domain.

mod catalog;
mod download;
mod status;

pub use catalog::{handle_refresh, handle_search};
pub use download::{handle_download, handle_file_info};
pub use status::{handle_health, handle_root, handle_servers, handle_status};

use crate::error::ApiError;

/// Require a non-empty query parameter.
pub(crate) fn require_param(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::validation(name, format!("missing required parameter: {}", name)))
}
