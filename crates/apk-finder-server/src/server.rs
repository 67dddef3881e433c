//! HTTP server implementation using Axum.

use crate::auth::require_token;
use crate::handlers::{
    handle_download, handle_file_info, handle_health, handle_refresh, handle_root,
    handle_search, handle_servers, handle_status,
};
use apk_finder_core::ApkFinder;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    pub finder: Arc<ApkFinder>,
    /// Token expected in `Authorization: Bearer <token>` on `/api/*`.
    pub api_token: String,
}

/// Build the router: public `/` and `/health`, token-protected `/api/*`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/search", post(handle_search))
        .route("/refresh", post(handle_refresh))
        .route("/download", get(handle_download))
        .route("/file/info", get(handle_file_info))
        .route("/status", get(handle_status))
        .route("/servers", get(handle_servers))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    finder: Arc<ApkFinder>,
    api_token: String,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let state = Arc::new(AppState { finder, api_token });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apk_finder_core::share::MockBackend;
    use apk_finder_core::{ShareBackend, ShareConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_router(dir: &TempDir) -> Router {
        let mock = Arc::new(MockBackend::new("server_1"));
        mock.add_file("/AppA/release/a.apk", vec![7u8; 32], chrono::Utc::now());
        let finder = ApkFinder::builder(dir.path())
            .shares(vec![ShareConfig {
                id: "server_1".to_string(),
                path: r"\\host\builds".to_string(),
                display_name: "Builds".to_string(),
                mount: None,
            }])
            .backend_factory(Arc::new(move |_: &ShareConfig| {
                mock.clone() as Arc<dyn ShareBackend>
            }))
            .in_memory_catalog(true)
            .build()
            .unwrap();
        build_router(Arc::new(AppState {
            finder: Arc::new(finder),
            api_token: "secret".to_string(),
        }))
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_is_public() {
        let dir = TempDir::new().unwrap();
        let response = test_router(&dir)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "APK Finder API");
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        let response = router
            .clone()
            .oneshot(Request::get("/api/servers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], 401);

        let response = router
            .oneshot(
                Request::get("/api/servers")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"][0]["name"], "server_1");
    }

    #[tokio::test]
    async fn test_download_missing_param() {
        let dir = TempDir::new().unwrap();
        let response = test_router(&dir)
            .oneshot(
                Request::get("/api/download?server=server_1")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], 400);
        assert!(body["detail"].as_str().unwrap().contains("path"));
    }

    #[tokio::test]
    async fn test_bad_search_body_is_json_error() {
        let dir = TempDir::new().unwrap();
        let response = test_router(&dir)
            .oneshot(
                Request::post("/api/search")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"keyword":"app","limit":-1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], 400);
        assert!(body["detail"].as_str().unwrap().contains("limit"));
    }

    #[tokio::test]
    async fn test_bad_query_is_json_error() {
        let dir = TempDir::new().unwrap();
        let response = test_router(&dir)
            .oneshot(
                Request::get("/api/file/info?server=server_1&path=/a.apk&path=/b.apk")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], 400);
    }

    #[tokio::test]
    async fn test_server_starts() {
        let dir = TempDir::new().unwrap();
        let finder = ApkFinder::builder(dir.path())
            .in_memory_catalog(true)
            .build()
            .unwrap();
        let addr = start_server(Arc::new(finder), "t".to_string(), "127.0.0.1", 0)
            .await
            .unwrap();
        assert!(addr.port() > 0);
    }
}
