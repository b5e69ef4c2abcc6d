//! Session pool module
//!
//! Owns the fixed fleet of automation sessions and everything about sharing
//! them: mutually-exclusive acquisition, FIFO queueing with position
//! callbacks, consecutive-failure tracking, and self-healing recovery. A
//! session is in at most one of idle / busy / recovering at any time, and a
//! freed slot is handed directly to the head of the waiter queue without ever
//! becoming observably idle in between.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as SessionMutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::session::BotSession;

/// Pool tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Launch attempts per session during initialization
    #[serde(default = "default_launch_attempts")]
    pub launch_attempts: u32,

    /// Fixed backoff between launch attempts
    #[serde(default = "default_launch_backoff")]
    pub launch_backoff: Duration,

    /// Consecutive failures that trigger recovery
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Interval between periodic health probes
    #[serde(default = "default_health_interval")]
    pub health_interval: Duration,
}

fn default_launch_attempts() -> u32 {
    2
}

fn default_launch_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_health_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            launch_attempts: default_launch_attempts(),
            launch_backoff: default_launch_backoff(),
            failure_threshold: default_failure_threshold(),
            health_interval: default_health_interval(),
        }
    }
}

/// Exclusive hold on one pooled session.
///
/// The holder is the only task allowed to drive the session until the lease
/// is passed back through [`SessionPool::release`].
pub struct Lease {
    pub session_id: String,
    pub session: Arc<SessionMutex<BotSession>>,
}

/// Queue-position callback, invoked with a 1-based position whenever the
/// waiter queue changes shape. Must not call back into the pool.
pub type PositionFn = Box<dyn Fn(usize) + Send + Sync>;

struct Waiter {
    tx: oneshot::Sender<Option<Lease>>,
    on_position: Option<PositionFn>,
}

/// Lifecycle state of one pooled session slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    NotReady,
    Idle,
    Busy,
    Recovering,
}

struct Slot {
    id: String,
    session: Arc<SessionMutex<BotSession>>,
    ready: bool,
    busy: bool,
    consecutive_failures: u32,
    last_error: Option<String>,
    launched_at: Option<DateTime<Utc>>,
}

struct PoolInner {
    slots: Vec<Slot>,
    waiters: VecDeque<Waiter>,
    recovering: HashSet<String>,
    last_error: Option<String>,
}

/// Per-session detail in a status report
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub state: SlotState,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub launched_at: Option<DateTime<Utc>>,
}

/// Snapshot of pool health for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// At least one session is ready
    pub ready: bool,
    pub size: usize,
    pub queue_depth: usize,
    /// No ready session is currently available
    pub all_busy: bool,
    pub last_error: Option<String>,
    pub sessions: Vec<SessionInfo>,
}

/// Fixed fleet of automation sessions with FIFO sharing and recovery
pub struct SessionPool {
    inner: Mutex<PoolInner>,
    config: PoolConfig,
}

impl SessionPool {
    /// Build a pool over an already-constructed fleet. No session is launched
    /// until [`SessionPool::init_all`] runs.
    pub fn new(sessions: Vec<BotSession>, config: PoolConfig) -> Self {
        let slots = sessions
            .into_iter()
            .map(|session| Slot {
                id: format!("session-{}", Uuid::new_v4()),
                session: Arc::new(SessionMutex::new(session)),
                ready: false,
                busy: false,
                consecutive_failures: 0,
                last_error: None,
                launched_at: None,
            })
            .collect();

        Self {
            inner: Mutex::new(PoolInner {
                slots,
                waiters: VecDeque::new(),
                recovering: HashSet::new(),
                last_error: None,
            }),
            config,
        }
    }

    /// Launch every session, strictly one at a time; parallel startup
    /// overloads the host the bridges run against.
    ///
    /// A session that exhausts its launch attempts is left not-ready and
    /// initialization moves on; partial availability is acceptable.
    pub async fn init_all(&self) {
        let fleet: Vec<(String, Arc<SessionMutex<BotSession>>)> = {
            let inner = self.inner.lock().unwrap();
            inner
                .slots
                .iter()
                .map(|slot| (slot.id.clone(), Arc::clone(&slot.session)))
                .collect()
        };

        for (id, session) in fleet {
            for attempt in 1..=self.config.launch_attempts {
                let outcome = session.lock().await.launch().await;
                match outcome {
                    Ok(()) => {
                        tracing::info!(session = %id, "session launched");
                        let mut inner = self.inner.lock().unwrap();
                        if let Some(slot) = inner.slots.iter_mut().find(|s| s.id == id) {
                            slot.ready = true;
                            slot.last_error = None;
                            slot.launched_at = Some(Utc::now());
                        }
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(session = %id, attempt, error = %e, "session launch failed");
                        let message = e.to_string();
                        let mut inner = self.inner.lock().unwrap();
                        if let Some(slot) = inner.slots.iter_mut().find(|s| s.id == id) {
                            slot.last_error = Some(message.clone());
                        }
                        inner.last_error = Some(message);
                        drop(inner);
                        if attempt < self.config.launch_attempts {
                            sleep(self.config.launch_backoff).await;
                        }
                    }
                }
            }
        }
    }

    /// Acquire an exclusive lease on a ready session.
    ///
    /// Resolves immediately when an idle ready session exists; otherwise the
    /// caller joins a strictly-FIFO queue. Returns `None` only when the pool
    /// was reset while waiting.
    pub async fn acquire(&self, on_position: Option<PositionFn>) -> Option<Lease> {
        let rx = {
            let mut inner = self.inner.lock().unwrap();

            let available = inner
                .slots
                .iter()
                .enumerate()
                .find(|(_, s)| s.ready && !s.busy && !inner.recovering.contains(&s.id))
                .map(|(i, _)| i);

            if let Some(index) = available {
                let slot = &mut inner.slots[index];
                slot.busy = true;
                return Some(Lease {
                    session_id: slot.id.clone(),
                    session: Arc::clone(&slot.session),
                });
            }

            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(Waiter { tx, on_position });
            let position = inner.waiters.len();
            if let Some(callback) = &inner.waiters.back().unwrap().on_position {
                callback(position);
            }
            rx
        };

        rx.await.unwrap_or(None)
    }

    /// Return a lease to the pool.
    ///
    /// With waiters queued the slot is handed straight to the head of the
    /// queue and stays busy throughout, so a concurrent `acquire` can never
    /// jump ahead of it. Otherwise the session becomes idle.
    pub fn release(&self, lease: Lease) {
        let mut inner = self.inner.lock().unwrap();
        let index = inner.slots.iter().position(|s| s.id == lease.session_id);
        let Some(index) = index else {
            return;
        };
        Self::dispatch_slot(&mut inner, index);
    }

    /// Hand the slot at `index` to the next live waiter, or mark it idle.
    fn dispatch_slot(inner: &mut PoolInner, index: usize) {
        loop {
            match inner.waiters.pop_front() {
                Some(waiter) => {
                    inner.slots[index].busy = true;
                    let lease = Lease {
                        session_id: inner.slots[index].id.clone(),
                        session: Arc::clone(&inner.slots[index].session),
                    };
                    if waiter.tx.send(Some(lease)).is_ok() {
                        Self::notify_positions(&inner.waiters);
                        return;
                    }
                    // Waiter abandoned its acquire; try the next one.
                }
                None => {
                    inner.slots[index].busy = false;
                    Self::notify_positions(&inner.waiters);
                    return;
                }
            }
        }
    }

    fn notify_positions(waiters: &VecDeque<Waiter>) {
        for (i, waiter) in waiters.iter().enumerate() {
            if let Some(callback) = &waiter.on_position {
                callback(i + 1);
            }
        }
    }

    /// Clear a session's consecutive-failure counter.
    pub fn record_success(&self, session_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.id == session_id) {
            slot.consecutive_failures = 0;
        }
    }

    /// Record a failure against a session. Reaching the threshold spawns
    /// background recovery unless one is already underway; the caller is
    /// never blocked.
    pub fn record_failure(self: &Arc<Self>, session_id: &str, error: &str) {
        let trigger = {
            let mut inner = self.inner.lock().unwrap();
            inner.last_error = Some(error.to_string());
            let recovering = inner.recovering.contains(session_id);
            match inner.slots.iter_mut().find(|s| s.id == session_id) {
                Some(slot) => {
                    slot.consecutive_failures += 1;
                    slot.last_error = Some(error.to_string());
                    slot.consecutive_failures >= self.config.failure_threshold && !recovering
                }
                None => false,
            }
        };

        if trigger {
            tracing::warn!(session = %session_id, "failure threshold reached, scheduling recovery");
            let pool = Arc::clone(self);
            let id = session_id.to_string();
            tokio::spawn(async move {
                pool.recover(&id).await;
            });
        }
    }

    /// Tear down and relaunch exactly one session.
    ///
    /// Idempotent per session id; skipped while the session is busy, since an
    /// in-flight request is never preempted. A later health check or failure
    /// picks the session up again.
    pub async fn recover(&self, session_id: &str) {
        let session = {
            let mut inner = self.inner.lock().unwrap();
            if inner.recovering.contains(session_id) {
                return;
            }
            let Some(index) = inner.slots.iter().position(|s| s.id == session_id) else {
                return;
            };
            if inner.slots[index].busy {
                return;
            }
            inner.recovering.insert(session_id.to_string());
            inner.slots[index].ready = false;
            Arc::clone(&inner.slots[index].session)
        };

        tracing::info!(session = %session_id, "recovering session");
        let outcome = {
            let mut session = session.lock().await;
            // Teardown is best-effort; the relaunch decides recovery success.
            let _ = session.close().await;
            session.launch().await
        };

        let mut inner = self.inner.lock().unwrap();
        inner.recovering.remove(session_id);
        let Some(index) = inner.slots.iter().position(|s| s.id == session_id) else {
            return;
        };

        match outcome {
            Ok(()) => {
                {
                    let slot = &mut inner.slots[index];
                    slot.ready = true;
                    slot.consecutive_failures = 0;
                    slot.last_error = None;
                    slot.launched_at = Some(Utc::now());
                }
                tracing::info!(session = %session_id, "session recovered");
                // Waiters may have queued while the session was down.
                Self::dispatch_slot(&mut inner, index);
            }
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "session recovery failed");
                let message = e.to_string();
                inner.slots[index].last_error = Some(message.clone());
                inner.last_error = Some(message);
            }
        }
    }

    /// Probe every ready-and-idle session; a failed probe triggers recovery.
    pub async fn run_health_checks(&self) {
        let candidates: Vec<(String, Arc<SessionMutex<BotSession>>)> = {
            let inner = self.inner.lock().unwrap();
            inner
                .slots
                .iter()
                .filter(|s| s.ready && !s.busy && !inner.recovering.contains(&s.id))
                .map(|s| (s.id.clone(), Arc::clone(&s.session)))
                .collect()
        };

        for (id, session) in candidates {
            // A session that became busy since the snapshot is skipped.
            let probe = match session.try_lock() {
                Ok(mut session) => session.ping().await,
                Err(_) => continue,
            };
            if let Err(e) = probe {
                tracing::warn!(session = %id, error = %e, "health probe failed");
                self.recover(&id).await;
            }
        }
    }

    /// Spawn the periodic health-check task.
    pub fn spawn_health_task(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(pool.config.health_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                pool.run_health_checks().await;
            }
        })
    }

    /// Abandon all queued work: every waiter resolves with the unavailable
    /// sentinel and all busy flags are cleared.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        while let Some(waiter) = inner.waiters.pop_front() {
            let _ = waiter.tx.send(None);
        }
        for slot in &mut inner.slots {
            slot.busy = false;
        }
    }

    /// Close every session, one at a time. Used on graceful shutdown.
    pub async fn shutdown_all(&self) {
        let fleet: Vec<(String, Arc<SessionMutex<BotSession>>)> = {
            let inner = self.inner.lock().unwrap();
            inner
                .slots
                .iter()
                .map(|slot| (slot.id.clone(), Arc::clone(&slot.session)))
                .collect()
        };

        for (id, session) in fleet {
            if let Err(e) = session.lock().await.close().await {
                tracing::warn!(session = %id, error = %e, "session close failed");
            }
        }
    }

    /// Snapshot pool health for the status endpoint.
    pub fn status(&self) -> PoolStatus {
        let inner = self.inner.lock().unwrap();
        let sessions: Vec<SessionInfo> = inner
            .slots
            .iter()
            .map(|slot| {
                let state = if inner.recovering.contains(&slot.id) {
                    SlotState::Recovering
                } else if !slot.ready {
                    SlotState::NotReady
                } else if slot.busy {
                    SlotState::Busy
                } else {
                    SlotState::Idle
                };
                SessionInfo {
                    id: slot.id.clone(),
                    state,
                    consecutive_failures: slot.consecutive_failures,
                    last_error: slot.last_error.clone(),
                    launched_at: slot.launched_at,
                }
            })
            .collect();

        PoolStatus {
            ready: inner.slots.iter().any(|s| s.ready),
            size: sessions.len(),
            queue_depth: inner.waiters.len(),
            all_busy: !sessions.iter().any(|s| s.state == SlotState::Idle),
            last_error: inner.last_error.clone(),
            sessions,
        }
    }
}
