//! Error responses.
//!
//! Every failed request is answered with `{code, detail}` and the HTTP
//! status of the underlying [`ApkFinderError`].

use apk_finder_core::ApkFinderError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Core error wrapped for axum.
#[derive(Debug)]
pub struct ApiError(pub ApkFinderError);

impl From<ApkFinderError> for ApiError {
    fn from(err: ApkFinderError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ApiError(ApkFinderError::Validation {
            field: field.to_string(),
            message: message.into(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        let body = Json(json!({
            "code": status.as_u16(),
            "detail": self.0.to_string(),
        }));
        let mut response = (status, body).into_response();

        match &self.0 {
            ApkFinderError::InvalidRange { size } => {
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                    response.headers_mut().insert(header::CONTENT_RANGE, value);
                }
            }
            ApkFinderError::Unauthorized => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }

        response
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_range_sets_content_range() {
        let response = ApiError(ApkFinderError::InvalidRange { size: 100 }).into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */100"
        );
    }

    #[test]
    fn test_status_mapping() {
        let response = ApiError(ApkFinderError::UnknownShare("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::validation("build_type", "bad").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
