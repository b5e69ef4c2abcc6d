//! HTTP request handlers

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Sse, sse::Event, sse::KeepAlive},
};
use futures_util::StreamExt;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use blockcheck_core::normalize_url;

use crate::ServerState;
use crate::api::{
    BatchItemEvent, BatchRequest, CheckQuery, ErrorResponse, RateStatus, StatusResponse,
};

/// Stream check events for a single URL via Server-Sent Events (SSE)
pub async fn check_stream(
    State(state): State<ServerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<CheckQuery>,
) -> impl IntoResponse {
    // Validation happens before any pool or rate-limit interaction.
    if let Err(e) = normalize_url(&query.url) {
        return error_response(StatusCode::BAD_REQUEST, &e.to_string());
    }

    let key = client_key(&addr);
    match state.single_limiter.try_acquire(&key) {
        Ok(remaining) => {
            tracing::debug!(client = %key, remaining, "single-check budget consumed");
        }
        Err(retry_after) => return rate_limited_response(retry_after),
    }

    // The check task is detached: a dropped stream severs the channel but
    // the session work runs to completion and is accounted for.
    let (tx, rx) = mpsc::unbounded_channel();
    let runner = Arc::clone(&state.runner);
    let url = query.url.clone();
    tokio::spawn(async move {
        runner.run(&url, tx).await;
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        let sse_event = Event::default()
            .json_data(&event)
            .unwrap_or_else(|_| Event::default().data("error serializing event"));
        Ok::<_, axum::Error>(sse_event)
    });

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}

/// Stream check events for a bounded batch of URLs
///
/// Items run sequentially; every event is tagged with its item index and URL.
pub async fn check_batch(
    State(state): State<ServerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<BatchRequest>,
) -> impl IntoResponse {
    if request.urls.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "batch is empty");
    }
    if request.urls.len() > state.config.max_batch_items {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("batch larger than {} items", state.config.max_batch_items),
        );
    }
    for (item, url) in request.urls.iter().enumerate() {
        if let Err(e) = normalize_url(url) {
            return error_response(StatusCode::BAD_REQUEST, &format!("item {item}: {e}"));
        }
    }

    let key = client_key(&addr);
    match state.batch_limiter.try_acquire(&key) {
        Ok(remaining) => {
            tracing::debug!(client = %key, remaining, "batch budget consumed");
        }
        Err(retry_after) => return rate_limited_response(retry_after),
    }

    let runner = Arc::clone(&state.runner);
    let urls = request.urls;

    let stream = async_stream::stream! {
        for (item, url) in urls.into_iter().enumerate() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let item_runner = Arc::clone(&runner);
            let check_url = url.clone();
            tokio::spawn(async move {
                item_runner.run(&check_url, tx).await;
            });

            while let Some(event) = rx.recv().await {
                let wrapped = BatchItemEvent {
                    item,
                    url: url.clone(),
                    event,
                };
                let sse_event = Event::default()
                    .json_data(&wrapped)
                    .unwrap_or_else(|_| Event::default().data("error serializing event"));
                yield Ok::<_, axum::Error>(sse_event);
            }
        }
    };

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}

/// Report pool health and the caller's remaining budgets.
///
/// Reading status never consumes a rate-limit slot.
pub async fn status(
    State(state): State<ServerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let key = client_key(&addr);
    let response = StatusResponse {
        pool: state.pool.status(),
        rate: RateStatus {
            single_remaining: state.single_limiter.remaining(&key),
            batch_remaining: state.batch_limiter.remaining(&key),
        },
    };

    Json(response).into_response()
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }))
}

fn client_key(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

/// Helper function to create error responses
fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

fn rate_limited_response(retry_after: Duration) -> axum::response::Response {
    let body = ErrorResponse::rate_limited(retry_after);
    let seconds = body.retry_after_secs.unwrap_or(1).to_string();
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, seconds)],
        Json(body),
    )
        .into_response()
}
