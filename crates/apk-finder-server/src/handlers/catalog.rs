//! Search and refresh handlers.

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::server::AppState;
use apk_finder_core::{BuildFilter, SearchQuery};
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

fn default_build_type() -> String {
    "release".to_string()
}

fn default_limit() -> usize {
    10
}

/// Body of `POST /api/search`.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default = "default_build_type")]
    pub build_type: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

pub async fn handle_search(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SearchRequest>,
) -> ApiResult<Json<Value>> {
    let build_filter: BuildFilter = request.build_type.parse()?;
    let query = SearchQuery {
        keyword: request.keyword,
        share: request.server.filter(|s| !s.is_empty()),
        build_filter,
        limit: request.limit,
        offset: request.offset,
    };
    debug!("Search: {:?}", query);

    let page = state.finder.search(&query)?;
    Ok(Json(json!({ "code": 200, "data": page })))
}

#[derive(Debug, Deserialize)]
pub struct RefreshParams {
    pub server: Option<String>,
}

pub async fn handle_refresh(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<RefreshParams>,
) -> ApiResult<Json<Value>> {
    let server = params.server.filter(|s| !s.is_empty());
    let message = state.finder.refresh(server.as_deref())?;
    Ok(Json(json!({ "code": 200, "message": message })))
}
