//! Check orchestration module
//!
//! Drives one end-user check request end to end: normalize the URL, lease a
//! session from the pool, submit the check command, stream vendor verdicts to
//! the caller as the bot's reply grows, and retry on a fresh lease when an
//! attempt produces nothing. A caller that disconnects mid-stream only stops
//! emission; the in-flight session work always runs to completion so the
//! lease is returned and accounted for.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::parser::{PlatformResult, PlatformStatus, parse_reply};
use crate::pool::{Lease, SessionPool};
use crate::session::SessionError;

mod url;

pub use url::normalize_url;

/// Longest accepted URL, pre-normalization
pub const MAX_URL_LEN: usize = 2048;

/// Errors surfaced by check orchestration
#[derive(Debug, Error)]
pub enum CheckError {
    /// URL rejected before any resource use
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The pool was reset while this request waited
    #[error("Session pool unavailable")]
    PoolUnavailable,

    /// Session failure during send or observe
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Streamed event for one check request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckEvent {
    /// Waiting for a session; 1-based queue position
    Queued { position: usize },

    /// One vendor verdict, emitted at most once per vendor name
    Platform { result: PlatformResult },

    /// The bot's trailing disclaimer, forwarded once
    Note { text: String },

    /// Terminal: distinct vendor verdicts emitted
    Done { count: usize },

    /// Terminal: all attempts exhausted
    Error { message: String },
}

/// Orchestrator tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Command prefix submitted ahead of the URL
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Attempts per request
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Hard deadline for the first attempt
    #[serde(default = "default_first_attempt_timeout")]
    pub first_attempt_timeout: Duration,

    /// Hard deadline for retry attempts
    #[serde(default = "default_retry_attempt_timeout")]
    pub retry_attempt_timeout: Duration,

    /// Stable polls required after the reply is complete
    #[serde(default = "default_stable_exit")]
    pub stable_exit: u32,

    /// Distinct results required before a reply may count as complete.
    /// Guards against declaring success on a still-initial partial edit.
    #[serde(default = "default_min_results")]
    pub min_results: usize,
}

fn default_command_prefix() -> String {
    "!check".to_string()
}

fn default_attempts() -> u32 {
    2
}

fn default_first_attempt_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_attempt_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_stable_exit() -> u32 {
    5
}

fn default_min_results() -> usize {
    10
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            attempts: default_attempts(),
            first_attempt_timeout: default_first_attempt_timeout(),
            retry_attempt_timeout: default_retry_attempt_timeout(),
            stable_exit: default_stable_exit(),
            min_results: default_min_results(),
        }
    }
}

/// Event emitter with detach-not-abort semantics.
///
/// The first failed send flips the emitter into a detached state: the check
/// keeps running, later events are dropped silently.
#[derive(Clone)]
struct Emitter {
    tx: mpsc::UnboundedSender<CheckEvent>,
    detached: Arc<AtomicBool>,
}

impl Emitter {
    fn new(tx: mpsc::UnboundedSender<CheckEvent>) -> Self {
        Self {
            tx,
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    fn emit(&self, event: CheckEvent) {
        if self.detached.load(Ordering::Relaxed) {
            return;
        }
        if self.tx.send(event).is_err() {
            tracing::debug!("caller detached, continuing unobserved");
            self.detached.store(true, Ordering::Relaxed);
        }
    }
}

/// Drives check requests over a session pool
pub struct CheckRunner {
    pool: Arc<SessionPool>,
    config: CheckConfig,
}

impl CheckRunner {
    pub fn new(pool: Arc<SessionPool>, config: CheckConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Run one check request, streaming events into `events`.
    ///
    /// Always ends with exactly one terminal event (`done` or `error`) unless
    /// the receiver is gone by then.
    pub async fn run(&self, raw_url: &str, events: mpsc::UnboundedSender<CheckEvent>) {
        let emitter = Emitter::new(events);

        let url = match normalize_url(raw_url) {
            Ok(url) => url,
            Err(e) => {
                emitter.emit(CheckEvent::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        let request_id = Uuid::new_v4();
        let command = format!("{} {}", self.config.command_prefix, url);

        // Names already streamed for this request. Survives retries so a
        // retry never re-emits what the caller already saw.
        let mut emitted: HashSet<String> = HashSet::new();
        let mut note_seen = false;
        let mut last_error: Option<CheckError> = None;

        for attempt in 1..=self.config.attempts {
            let timeout = if attempt == 1 {
                self.config.first_attempt_timeout
            } else {
                self.config.retry_attempt_timeout
            };

            let queue_emitter = emitter.clone();
            let lease = self
                .pool
                .acquire(Some(Box::new(move |position| {
                    queue_emitter.emit(CheckEvent::Queued { position });
                })))
                .await;
            let Some(lease) = lease else {
                emitter.emit(CheckEvent::Error {
                    message: CheckError::PoolUnavailable.to_string(),
                });
                return;
            };

            tracing::info!(%request_id, url = %url, attempt, session = %lease.session_id, "check attempt started");

            let outcome = self
                .run_attempt(&lease, &command, timeout, &mut emitted, &mut note_seen, &emitter)
                .await;

            match outcome {
                Ok(captured) => {
                    self.pool.record_success(&lease.session_id);
                    self.pool.release(lease);

                    if captured == 0 && attempt < self.config.attempts {
                        tracing::warn!(%request_id, url = %url, attempt, "attempt captured nothing, retrying");
                        continue;
                    }
                    if captured == 0 {
                        // Terminal success with empty results, by contract.
                        tracing::warn!(%request_id, url = %url, "check finished without any results");
                    }
                    emitter.emit(CheckEvent::Done {
                        count: emitted.len(),
                    });
                    return;
                }
                Err(e) => {
                    tracing::warn!(%request_id, url = %url, attempt, error = %e, "check attempt failed");
                    self.pool.record_failure(&lease.session_id, &e.to_string());
                    self.pool.release(lease);
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "check failed".to_string());
        emitter.emit(CheckEvent::Error { message });
    }

    /// One attempt: send the command and stream the growing reply.
    ///
    /// Returns the number of results parsed out of the final observed
    /// content, which may be zero without being an error.
    async fn run_attempt(
        &self,
        lease: &Lease,
        command: &str,
        timeout: Duration,
        emitted: &mut HashSet<String>,
        note_seen: &mut bool,
        emitter: &Emitter,
    ) -> Result<usize, CheckError> {
        let mut session = lease.session.lock().await;
        let baseline = session.send_command(command).await?;

        let mut captured = 0usize;
        let min_results = self.config.min_results;

        session
            .observe_reply(
                baseline,
                |content| {
                    let parsed = parse_reply(&content.text, &content.fragments);
                    captured = parsed.results.len();

                    let mut any_loading = false;
                    for result in &parsed.results {
                        if result.status == PlatformStatus::Loading {
                            any_loading = true;
                            continue;
                        }
                        if emitted.insert(result.name.to_ascii_lowercase()) {
                            emitter.emit(CheckEvent::Platform {
                                result: result.clone(),
                            });
                        }
                    }

                    if let Some(note) = &parsed.note {
                        if !*note_seen {
                            *note_seen = true;
                            emitter.emit(CheckEvent::Note { text: note.clone() });
                        }
                    }

                    !any_loading && *note_seen && parsed.results.len() >= min_results
                },
                timeout,
                self.config.stable_exit,
            )
            .await?;

        Ok(captured)
    }
}
