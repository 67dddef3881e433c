//! APK Finder Server - HTTP API over the APK Finder core.
//!
//! Exposes search, refresh, download, file info, status, servers and health
//! endpoints. Everything under `/api` requires a bearer token.

mod auth;
mod error;
mod extract;
mod handlers;
mod server;

pub use auth::bearer_token;
pub use error::{ApiError, ApiResult};
pub use extract::{ApiJson, ApiQuery};
pub use server::{build_router, start_server, AppState};
