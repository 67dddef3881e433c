//! Facade builder and response types.

mod builder;
mod types;

pub use builder::ApkFinderBuilder;
pub use types::{FileInfo, HealthReport, ServerStatus, ServiceHealth, ShareSummary, SystemStatus};
