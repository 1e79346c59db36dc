//! DDoS detection for the firewall.
//!
//! Counts every request a client makes over a configurable trailing window.
//! The request that pushes the count above the threshold is blocked and the
//! client receives a temporary ban. Unlike the rate limiter, every request is
//! recorded, blocked or not.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::Mutex;

use crate::core::ban_store::BanStore;
use crate::core::Detection;
use crate::models::{AttackType, Decision, SecuritySettings};

/// Interval of the history sweep. Independent of the configured window.
pub const HISTORY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Reason attached to bans this detector creates.
pub const ABUSE_REASON: &str = "abuse detected";

/// DDoS detector implementation
#[derive(Default)]
pub struct DdosDetector {
    /// Request timestamps per client inside the current window, oldest first
    request_tracker: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl DdosDetector {
    /// Create a new DDoS detector instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a request should be blocked due to DDoS detection
    ///
    /// # Arguments
    ///
    /// * `ip` - The client the request came from
    /// * `settings` - Current protection settings
    /// * `bans` - Where a triggered ban is recorded
    ///
    /// # Returns
    ///
    /// * `None` if the request should be allowed or the layer is disabled
    /// * `Some(Detection)` if the request pushed the client over the threshold
    pub fn check(&self, ip: &str, settings: &SecuritySettings, bans: &BanStore) -> Option<Detection> {
        self.check_at(ip, settings, bans, Instant::now())
    }

    pub fn check_at(
        &self,
        ip: &str,
        settings: &SecuritySettings,
        bans: &BanStore,
        now: Instant,
    ) -> Option<Detection> {
        if !settings.enable_ddos_protection {
            return None;
        }

        let window = Duration::from_secs(settings.ddos_time_window);
        let count = {
            let mut tracker = self.request_tracker.lock();
            let history = tracker.entry(ip.to_string()).or_default();
            history.push_back(now);
            evict_older_than(history, now, window);
            history.len()
        };

        if count <= settings.ddos_threshold as usize {
            return None;
        }

        let duration = Duration::from_secs(settings.ddos_ban_duration.saturating_mul(60));
        let ban = bans.add(ip, ABUSE_REASON, duration);
        warn!(
            "DDoS threshold exceeded by {}: {} requests in {}s",
            ip, count, settings.ddos_time_window
        );

        Some(Detection {
            decision: Decision::attack(ABUSE_REASON, AttackType::Ddos),
            ban: Some((ban, duration)),
        })
    }

    /// Drop history entries older than `window`, returning how many went.
    pub fn sweep(&self, window: Duration) -> usize {
        self.sweep_at(window, Instant::now())
    }

    pub fn sweep_at(&self, window: Duration, now: Instant) -> usize {
        let mut tracker = self.request_tracker.lock();
        let mut removed = 0;
        tracker.retain(|_, history| {
            let before = history.len();
            evict_older_than(history, now, window);
            removed += before - history.len();
            !history.is_empty()
        });
        removed
    }

    /// Requests currently tracked for `ip`
    pub fn tracked(&self, ip: &str) -> usize {
        self.request_tracker.lock().get(ip).map_or(0, VecDeque::len)
    }

    /// Reset DDoS detection for a given IP
    pub fn reset_detection(&self, ip: &str) -> bool {
        self.request_tracker.lock().remove(ip).is_some()
    }

    /// Forget the history of every client
    pub fn clear(&self) {
        self.request_tracker.lock().clear();
    }
}

// An entry counts while it is strictly newer than `now - window`.
fn evict_older_than(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = history.front() {
        if now.saturating_duration_since(*oldest) < window {
            break;
        }
        history.pop_front();
    }
}
