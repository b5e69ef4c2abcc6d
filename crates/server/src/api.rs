//! API models and server state

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use blockcheck_core::{CheckEvent, CheckRunner, PoolStatus, SessionPool};

use crate::limiter::SlidingWindowLimiter;

/// Server tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Single-check requests allowed per client per window
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Batch requests allowed per client per window. A fraction of the
    /// single budget: one batch item can trigger a full check.
    #[serde(default = "default_batch_rate_limit")]
    pub batch_rate_limit: u32,

    /// Sliding-window length for both budgets
    #[serde(default = "default_rate_window")]
    pub rate_window: Duration,

    /// Largest accepted batch
    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,
}

fn default_rate_limit() -> u32 {
    10
}

fn default_batch_rate_limit() -> u32 {
    3
}

fn default_rate_window() -> Duration {
    Duration::from_secs(60)
}

fn default_max_batch_items() -> usize {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit(),
            batch_rate_limit: default_batch_rate_limit(),
            rate_window: default_rate_window(),
            max_batch_items: default_max_batch_items(),
        }
    }
}

/// Query parameters for the single-check stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckQuery {
    pub url: String,
}

/// Request body for the batch endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub urls: Vec<String>,
}

/// One event of a batch stream, tagged with the item it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemEvent {
    pub item: usize,
    pub url: String,
    #[serde(flatten)]
    pub event: CheckEvent,
}

/// Caller's remaining budgets, reported by the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateStatus {
    pub single_remaining: u32,
    pub batch_remaining: u32,
}

/// Response for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub pool: PoolStatus,
    pub rate: RateStatus,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Seconds until the rate budget frees up, on 429 responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            error: "rate limit exceeded".to_string(),
            retry_after_secs: Some(retry_after.as_secs().max(1)),
        }
    }
}

/// Server state
///
/// Shared state across all HTTP handlers; constructed once at startup and
/// passed by handle, never through globals.
#[derive(Clone)]
pub struct ServerState {
    /// Check orchestrator
    pub runner: Arc<CheckRunner>,

    /// Session pool, for status and shutdown
    pub pool: Arc<SessionPool>,

    /// Single-check budget
    pub single_limiter: Arc<SlidingWindowLimiter>,

    /// Batch budget
    pub batch_limiter: Arc<SlidingWindowLimiter>,

    /// Server configuration
    pub config: ServerConfig,
}

impl ServerState {
    /// Create server state around an orchestrator.
    pub fn new(runner: CheckRunner, config: ServerConfig) -> Self {
        let pool = Arc::clone(runner.pool());
        Self {
            runner: Arc::new(runner),
            pool,
            single_limiter: Arc::new(SlidingWindowLimiter::new(
                config.rate_limit,
                config.rate_window,
            )),
            batch_limiter: Arc::new(SlidingWindowLimiter::new(
                config.batch_rate_limit,
                config.rate_window,
            )),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.rate_limit, 10);
        assert_eq!(config.batch_rate_limit, 3);
        assert!(config.batch_rate_limit < config.rate_limit);
        assert_eq!(config.max_batch_items, 5);
    }

    #[test]
    fn test_batch_item_event_flattens_inner_event() {
        let event = BatchItemEvent {
            item: 2,
            url: "example.com".to_string(),
            event: CheckEvent::Done { count: 12 },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["item"], 2);
        assert_eq!(json["type"], "done");
        assert_eq!(json["count"], 12);
    }

    #[test]
    fn test_error_response_serialization() {
        let plain = ErrorResponse::new("bad input");
        let json = serde_json::to_string(&plain).unwrap();
        assert!(!json.contains("retry_after_secs"));

        let limited = ErrorResponse::rate_limited(Duration::from_secs(30));
        let json = serde_json::to_string(&limited).unwrap();
        assert!(json.contains("retry_after_secs"));
    }
}
