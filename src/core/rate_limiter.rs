//! Sliding-window rate limiting for the firewall.
//!
//! Each client key keeps the timestamps of its admitted requests over the
//! trailing 60 seconds. Rejected requests are not recorded, so a client that
//! keeps hammering is admitted again as soon as old entries age out.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Length of the trailing window every limit is expressed against.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// In-memory per-key sliding-window limiter
pub struct RateLimiter {
    /// Admitted request timestamps per key, oldest first
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    /// Requests allowed per window
    limit: AtomicU32,
}

impl RateLimiter {
    /// Create a new rate limiter admitting `limit` requests per key per minute
    pub fn new(limit: u32) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limit: AtomicU32::new(limit),
        }
    }

    /// Check whether a request for `key` may proceed, recording it if so.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to rate limit (e.g., IP address)
    ///
    /// # Returns
    ///
    /// * `true` if the request is admitted
    /// * `false` if the key already used its allowance for the window
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let limit = self.limit.load(Ordering::Acquire) as usize;
        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_string()).or_default();

        purge(window, now);

        if window.len() >= limit {
            return false;
        }

        window.push_back(now);
        true
    }

    /// Replace the per-window cap for subsequent calls
    pub fn update_limit(&self, limit: u32) {
        self.limit.store(limit, Ordering::Release);
    }

    pub fn limit(&self) -> u32 {
        self.limit.load(Ordering::Acquire)
    }

    /// Requests currently counted against each key
    pub fn snapshot(&self) -> HashMap<String, usize> {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> HashMap<String, usize> {
        let windows = self.windows.lock();
        windows
            .iter()
            .map(|(key, window)| {
                let live = window
                    .iter()
                    .filter(|at| !is_stale(**at, now))
                    .count();
                (key.clone(), live)
            })
            .filter(|(_, live)| *live > 0)
            .collect()
    }

    /// Forget keys whose windows have fully aged out
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, window| {
            purge(window, now);
            !window.is_empty()
        });
        before - windows.len()
    }

    /// Reset the window for a given key. Returns false if it had none.
    pub fn reset(&self, key: &str) -> bool {
        self.windows.lock().remove(key).is_some()
    }

    /// Drop every tracked window, returning how many keys were tracked
    pub fn clear(&self) -> usize {
        let mut windows = self.windows.lock();
        let count = windows.len();
        windows.clear();
        count
    }
}

fn is_stale(at: Instant, now: Instant) -> bool {
    now.saturating_duration_since(at) >= RATE_LIMIT_WINDOW
}

fn purge(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = window.front() {
        if !is_stale(*oldest, now) {
            break;
        }
        window.pop_front();
    }
}
