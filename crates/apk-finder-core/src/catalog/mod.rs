//! Catalog store for indexed APK records.
//!
//! The catalog is keyed by (share, top-level directory). Each key holds the
//! list of records found under that directory plus the scan metadata used
//! for change detection. It is the single source of truth for search.

mod sqlite;
mod traits;

pub use sqlite::SqliteCatalog;
pub use traits::{CatalogEntry, CatalogStore};
