//! # blockcheck-core
//!
//! An async-first library for checking whether a URL is categorized or
//! blocked by content-filter vendors, by proxying the question to a
//! checker bot that is only reachable through an interactive session.
//!
//! ## Features
//!
//! - `Surface` trait abstracting the rendered interactive session, with a
//!   bridge-process implementation speaking NDJSON over stdio
//! - `BotSession` automation: launch, command submission with acceptance
//!   verification, and in-place reply-edit observation
//! - `SessionPool`: a fixed fleet with FIFO queueing, failure tracking, and
//!   self-healing recovery
//! - Tolerant reply parsing into typed per-vendor verdicts
//! - `CheckRunner`: streaming check orchestration with retry on a fresh
//!   session and detach-not-abort cancellation
//!
//! ## Quick Start
//!
//! ```ignore
//! use blockcheck_core::{
//!     BotSession, BridgeSurface, CheckConfig, CheckRunner, PoolConfig,
//!     SessionConfig, SessionPool,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SessionConfig::builder()
//!         .with_bridge_command(vec!["session-bridge".into()])
//!         .with_token("identity-token")
//!         .with_channel_id("channel-id")
//!         .with_bot_user_id("bot-id")
//!         .with_bot_name("checkbot")
//!         .build();
//!
//!     let surface = BridgeSurface::new(
//!         config.bridge_command.clone(),
//!         config.token.clone(),
//!         config.channel_id.clone(),
//!     );
//!     let session = BotSession::new(config, Box::new(surface));
//!
//!     let pool = Arc::new(SessionPool::new(vec![session], PoolConfig::default()));
//!     pool.init_all().await;
//!     pool.spawn_health_task();
//!
//!     let runner = CheckRunner::new(pool, CheckConfig::default());
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     tokio::spawn(async move { runner.run("example.com", tx).await });
//!     while let Some(event) = rx.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

// Re-export public API
pub mod check;
pub mod parser;
pub mod pool;
pub mod session;
pub mod surface;

// Convenience re-exports for common types
pub use check::{CheckConfig, CheckError, CheckEvent, CheckRunner, MAX_URL_LEN, normalize_url};

pub use parser::{ParsedReply, PlatformResult, PlatformStatus, parse_reply};

pub use pool::{Lease, PoolConfig, PoolStatus, PositionFn, SessionInfo, SessionPool, SlotState};

pub use session::{
    BotSession, ReplyBaseline, ReplyContent, SessionConfig, SessionError, SessionResult,
};

pub use surface::{BridgeSurface, Fragment, RenderedMessage, Surface, SurfaceError};
