//! Per-client sliding-window rate limiting
//!
//! One limiter instance covers one budget: the single-check endpoint and the
//! batch endpoint each get their own, the batch budget being a fraction of
//! the single budget since one batch item can trigger a full check. Reading
//! the remaining budget never consumes a slot.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window limiter keyed by client
pub struct SlidingWindowLimiter {
    limit: u32,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    /// Allow `limit` acquisitions per `window` per client key.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn prune(&self, hits: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = hits.front() {
            if now.duration_since(*oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// Consume one slot for `key`.
    ///
    /// Returns the remaining budget, or the duration until the oldest hit
    /// leaves the window when the budget is exhausted.
    pub fn try_acquire(&self, key: &str) -> Result<u32, Duration> {
        let now = Instant::now();
        let mut map = self.hits.lock().unwrap();
        let hits = map.entry(key.to_string()).or_default();
        self.prune(hits, now);

        if hits.len() >= self.limit as usize {
            let oldest = *hits.front().expect("non-empty at limit");
            return Err(self.window - now.duration_since(oldest));
        }

        hits.push_back(now);
        Ok(self.limit - hits.len() as u32)
    }

    /// Remaining budget for `key` without consuming anything.
    pub fn remaining(&self, key: &str) -> u32 {
        let now = Instant::now();
        let mut map = self.hits.lock().unwrap();
        match map.get_mut(key) {
            Some(hits) => {
                self.prune(hits, now);
                self.limit.saturating_sub(hits.len() as u32)
            }
            None => self.limit,
        }
    }
}
