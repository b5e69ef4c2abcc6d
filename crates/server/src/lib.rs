//! blockcheck-server
//!
//! HTTP/SSE layer for blockcheck: streaming single and batch check
//! endpoints, a non-consuming status endpoint, per-client rate limiting,
//! and graceful shutdown that tears down every session before exit.

pub mod api;
pub mod handlers;
pub mod limiter;
pub mod routes;

pub use api::{ServerConfig, ServerState};
pub use limiter::SlidingWindowLimiter;
pub use routes::create_router;

pub use blockcheck_core;

use std::net::SocketAddr;

/// Bind and serve until termination.
///
/// On ctrl-c the listener drains and every pooled session is closed before
/// this returns.
pub async fn serve(addr: SocketAddr, state: ServerState) -> anyhow::Result<()> {
    let pool = std::sync::Arc::clone(&state.pool);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("shutting down, closing sessions");
    pool.shutdown_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install ctrl-c handler");
    }
}
