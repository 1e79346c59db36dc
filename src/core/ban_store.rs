//! Time-limited bans keyed by client identity.
//!
//! Bans are kept in a map so a key can never hold more than one live ban;
//! adding a ban for a key that already has one replaces it. Expired entries are
//! evicted lazily when looked up and proactively by [`BanStore::sweep`].

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::TemporaryBan;

/// Interval of the proactive expiry sweep.
pub const BAN_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Default)]
pub struct BanStore {
    bans: Mutex<HashMap<String, TemporaryBan>>,
}

impl BanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ban `ip` for `duration`, replacing any ban it already has.
    pub fn add(&self, ip: &str, reason: &str, duration: Duration) -> TemporaryBan {
        self.add_at(ip, reason, duration, Utc::now())
    }

    pub fn add_at(&self, ip: &str, reason: &str, duration: Duration, now: DateTime<Utc>) -> TemporaryBan {
        let expires_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let ban = TemporaryBan {
            ip: ip.to_string(),
            reason: reason.to_string(),
            expires_at,
        };

        self.bans.lock().insert(ip.to_string(), ban.clone());
        ban
    }

    /// Reinstate previously persisted bans. Later entries for the same key win.
    pub fn restore(&self, bans: impl IntoIterator<Item = TemporaryBan>) {
        let mut store = self.bans.lock();
        for ban in bans {
            store.insert(ban.ip.clone(), ban);
        }
    }

    /// Lift the ban for `ip`. Returns whether one existed.
    pub fn remove(&self, ip: &str) -> bool {
        self.bans.lock().remove(ip).is_some()
    }

    /// Return the live ban reason for `ip`, evicting it if it has expired.
    pub fn is_banned(&self, ip: &str) -> Option<String> {
        self.is_banned_at(ip, Utc::now())
    }

    pub fn is_banned_at(&self, ip: &str, now: DateTime<Utc>) -> Option<String> {
        let mut bans = self.bans.lock();
        match bans.get(ip) {
            Some(ban) if ban.is_expired_at(now) => {
                bans.remove(ip);
                None
            }
            Some(ban) => Some(ban.reason.clone()),
            None => None,
        }
    }

    /// Remove every expired ban, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut bans = self.bans.lock();
        let before = bans.len();
        bans.retain(|_, ban| !ban.is_expired_at(now));
        before - bans.len()
    }

    /// Drop all bans, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut bans = self.bans.lock();
        let count = bans.len();
        bans.clear();
        count
    }

    /// Live bans ordered by expiry, soonest first.
    pub fn snapshot(&self) -> Vec<TemporaryBan> {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<TemporaryBan> {
        let mut bans: Vec<TemporaryBan> = self.bans.lock()
            .values()
            .filter(|ban| !ban.is_expired_at(now))
            .cloned()
            .collect();
        bans.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.ip.cmp(&b.ip)));
        bans
    }

    pub fn len(&self) -> usize {
        self.bans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
