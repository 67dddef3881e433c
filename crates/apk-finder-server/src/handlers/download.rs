//! Streaming download and file metadata handlers.

use super::require_param;
use crate::error::ApiResult;
use crate::extract::ApiQuery;
use crate::server::AppState;
use apk_finder_core::{DownloadRequest, FileInfo};
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub path: Option<String>,
    pub server: Option<String>,
    pub filename: Option<String>,
}

pub async fn handle_download(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<DownloadParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let request = DownloadRequest {
        share: require_param(params.server, "server")?,
        path: require_param(params.path, "path")?,
        filename: params.filename,
        range: headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let download = state.finder.download(&request).await?;

    let mut response = Response::new(Body::from_stream(download.body));
    *response.status_mut() = StatusCode::from_u16(download.status).unwrap_or(StatusCode::OK);
    for (name, value) in download.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => warn!("Dropping unrepresentable {} header: {:?}", name, value),
        }
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct FileInfoParams {
    pub path: Option<String>,
    pub server: Option<String>,
}

pub async fn handle_file_info(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<FileInfoParams>,
) -> ApiResult<Json<FileInfo>> {
    let server = require_param(params.server, "server")?;
    let path = require_param(params.path, "path")?;
    Ok(Json(state.finder.file_info(&server, &path).await?))
}
