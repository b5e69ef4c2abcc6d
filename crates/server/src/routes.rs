//! Route definitions and router setup

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ServerState;
use crate::handlers;

/// Create the application router with all routes
pub fn create_router(state: ServerState) -> Router {
    // Build API routes
    let api_routes = Router::new()
        // Check operations
        .route("/check/stream", get(handlers::check_stream))
        .route("/check/batch", post(handlers::check_batch))
        // Pool and budget status
        .route("/status", get(handlers::status))
        // Health check
        .route("/health", get(handlers::health_check));

    // Combine with base path, layers, and state
    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ServerConfig;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use blockcheck_core::{CheckConfig, CheckRunner, PoolConfig, SessionPool};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(config: ServerConfig) -> ServerState {
        // An empty fleet is enough to exercise routing, validation, and
        // rate limiting; no check ever completes against it.
        let pool = Arc::new(SessionPool::new(Vec::new(), PoolConfig::default()));
        let runner = CheckRunner::new(pool, CheckConfig::default());
        ServerState::new(runner, config)
    }

    fn request(method: &str, uri: &str, body: Body) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        if method == "POST" {
            builder = builder.header("content-type", "application/json");
        }
        builder.body(body).unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let router = create_router(test_state(ServerConfig::default()));
        let response = router
            .oneshot(request("GET", "/api/health", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_with_400() {
        let router = create_router(test_state(ServerConfig::default()));
        let response = router
            .oneshot(request(
                "GET",
                "/api/check/stream?url=%3Cscript%3E",
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rate_limit_enforced_on_check_stream() {
        let config = ServerConfig {
            rate_limit: 1,
            ..ServerConfig::default()
        };
        let router = create_router(test_state(config));

        let first = router
            .clone()
            .oneshot(request(
                "GET",
                "/api/check/stream?url=example.com",
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = router
            .oneshot(request(
                "GET",
                "/api/check/stream?url=example.com",
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn test_batch_size_bounded() {
        let router = create_router(test_state(ServerConfig::default()));
        let urls: Vec<String> = (0..6).map(|i| format!("example{i}.com")).collect();
        let body = serde_json::to_string(&serde_json::json!({ "urls": urls })).unwrap();

        let response = router
            .oneshot(request("POST", "/api/check/batch", Body::from(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_rejects_invalid_item() {
        let router = create_router(test_state(ServerConfig::default()));
        let body = r#"{"urls": ["example.com", "<script>"]}"#;

        let response = router
            .oneshot(request("POST", "/api/check/batch", Body::from(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_does_not_consume_rate_budget() {
        let config = ServerConfig {
            rate_limit: 1,
            ..ServerConfig::default()
        };
        let router = create_router(test_state(config));

        for _ in 0..3 {
            let response = router
                .clone()
                .oneshot(request("GET", "/api/status", Body::empty()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        // The whole single-check budget is still available.
        let response = router
            .clone()
            .oneshot(request("GET", "/api/status", Body::empty()))
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status["rate"]["single_remaining"], 1);

        let check = router
            .oneshot(request(
                "GET",
                "/api/check/stream?url=example.com",
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(check.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_reports_pool_shape() {
        let router = create_router(test_state(ServerConfig::default()));
        let response = router
            .oneshot(request("GET", "/api/status", Body::empty()))
            .await
            .unwrap();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status["ready"], false);
        assert_eq!(status["size"], 0);
        assert_eq!(status["queue_depth"], 0);
    }
}
