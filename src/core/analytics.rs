//! Analytics for the firewall.
//!
//! Records the outcome of every request into running totals, per-client and
//! per-user-agent counters and the 24 most recent hourly buckets. Recording
//! never influences a decision.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Buckets kept in the rolling history.
pub const HOURLY_HISTORY: usize = 24;

const SECONDS_PER_HOUR: i64 = 3600;

/// Request counts for one clock hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyBucket {
    pub hour_start: DateTime<Utc>,
    pub total: u64,
    pub blocked: u64,
    pub allowed: u64,
}

impl HourlyBucket {
    fn empty(hour_start: DateTime<Utc>) -> Self {
        Self {
            hour_start,
            total: 0,
            blocked: 0,
            allowed: 0,
        }
    }

    fn count(&mut self, blocked: bool) {
        self.total += 1;
        if blocked {
            self.blocked += 1;
        } else {
            self.allowed += 1;
        }
    }
}

/// Accumulated counters for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpStat {
    pub ip: String,
    pub requests: u64,
    pub blocked: u64,
    pub last_seen: DateTime<Utc>,
}

/// Accumulated counters for one user agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentStat {
    pub user_agent: String,
    pub requests: u64,
    pub blocked: u64,
    pub last_seen: DateTime<Utc>,
}

/// Overall totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_requests: u64,
    pub total_blocked: u64,
    pub total_allowed: u64,
    pub unique_ips: usize,
    pub unique_user_agents: usize,
    pub uptime_seconds: i64,
    pub start_time: DateTime<Utc>,
}

struct StatsState {
    /// Ring of at most `HOURLY_HISTORY` buckets in append order; a new hour
    /// evicts the oldest bucket once the ring is full
    hourly: VecDeque<HourlyBucket>,
    ip_stats: HashMap<String, IpStat>,
    user_agent_stats: HashMap<String, UserAgentStat>,
    total_requests: u64,
    total_blocked: u64,
    start_time: DateTime<Utc>,
}

impl StatsState {
    fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            hourly: VecDeque::with_capacity(HOURLY_HISTORY),
            ip_stats: HashMap::new(),
            user_agent_stats: HashMap::new(),
            total_requests: 0,
            total_blocked: 0,
            start_time,
        }
    }

    fn record_hour(&mut self, blocked: bool, now: DateTime<Utc>) {
        let hour = now.timestamp().div_euclid(SECONDS_PER_HOUR) * SECONDS_PER_HOUR;
        let hour_start = Utc.timestamp_opt(hour, 0).single().unwrap_or(now);

        match self.hourly.back().map(|last| last.hour_start) {
            Some(latest) if latest >= hour_start => {
                // Late records count only while their hour is still held.
                if let Some(bucket) = self
                    .hourly
                    .iter_mut()
                    .rev()
                    .find(|bucket| bucket.hour_start == hour_start)
                {
                    bucket.count(blocked);
                }
            }
            _ => {
                if self.hourly.len() == HOURLY_HISTORY {
                    self.hourly.pop_front();
                }
                let mut bucket = HourlyBucket::empty(hour_start);
                bucket.count(blocked);
                self.hourly.push_back(bucket);
            }
        }
    }
}

/// Analytics service
pub struct Analytics {
    state: RwLock<StatsState>,
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new()
    }
}

impl Analytics {
    /// Create a new analytics instance
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StatsState::new(Utc::now())),
        }
    }

    /// Record the outcome of one request
    pub fn record_request(&self, ip: &str, user_agent: &str, blocked: bool) {
        self.record_request_at(ip, user_agent, blocked, Utc::now());
    }

    pub fn record_request_at(&self, ip: &str, user_agent: &str, blocked: bool, now: DateTime<Utc>) {
        let mut state = self.state.write();
        let blocked_count = u64::from(blocked);

        state.total_requests += 1;
        state.total_blocked += blocked_count;

        let ip_stat = state.ip_stats.entry(ip.to_string()).or_insert_with(|| IpStat {
            ip: ip.to_string(),
            requests: 0,
            blocked: 0,
            last_seen: now,
        });
        ip_stat.requests += 1;
        ip_stat.blocked += blocked_count;
        ip_stat.last_seen = now;

        let ua_stat = state
            .user_agent_stats
            .entry(user_agent.to_string())
            .or_insert_with(|| UserAgentStat {
                user_agent: user_agent.to_string(),
                requests: 0,
                blocked: 0,
                last_seen: now,
            });
        ua_stat.requests += 1;
        ua_stat.blocked += blocked_count;
        ua_stat.last_seen = now;

        state.record_hour(blocked, now);
    }

    /// The most recent 24 hourly buckets, oldest first
    pub fn hourly_stats(&self) -> Vec<HourlyBucket> {
        self.state.read().hourly.iter().cloned().collect()
    }

    /// The `limit` busiest clients by request count
    pub fn top_ips(&self, limit: usize) -> Vec<IpStat> {
        let state = self.state.read();
        let mut ips: Vec<IpStat> = state.ip_stats.values().cloned().collect();
        ips.sort_by(|a, b| b.requests.cmp(&a.requests).then_with(|| a.ip.cmp(&b.ip)));
        ips.truncate(limit);
        ips
    }

    /// The `limit` most frequent user agents by request count
    pub fn top_user_agents(&self, limit: usize) -> Vec<UserAgentStat> {
        let state = self.state.read();
        let mut agents: Vec<UserAgentStat> = state.user_agent_stats.values().cloned().collect();
        agents.sort_by(|a, b| {
            b.requests
                .cmp(&a.requests)
                .then_with(|| a.user_agent.cmp(&b.user_agent))
        });
        agents.truncate(limit);
        agents
    }

    pub fn ip_stat(&self, ip: &str) -> Option<IpStat> {
        self.state.read().ip_stats.get(ip).cloned()
    }

    /// Get analytics summary
    pub fn summary(&self) -> StatsSummary {
        self.summary_at(Utc::now())
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> StatsSummary {
        let state = self.state.read();
        StatsSummary {
            total_requests: state.total_requests,
            total_blocked: state.total_blocked,
            total_allowed: state.total_requests - state.total_blocked,
            unique_ips: state.ip_stats.len(),
            unique_user_agents: state.user_agent_stats.len(),
            uptime_seconds: (now - state.start_time).num_seconds().max(0),
            start_time: state.start_time,
        }
    }

    /// Reset every counter and restart the uptime clock
    pub fn clear(&self) {
        *self.state.write() = StatsState::new(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(hour: i64, minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 - 1_700_000_000 % 3600, 0).unwrap()
            + Duration::hours(hour)
            + Duration::minutes(minute)
    }

    #[test]
    fn test_allowed_requests_accumulate() {
        let analytics = Analytics::new();
        analytics.record_request_at("10.0.0.1", "curl/8.0", false, at(0, 5));
        analytics.record_request_at("10.0.0.1", "curl/8.0", false, at(0, 10));

        let stat = analytics.ip_stat("10.0.0.1").unwrap();
        assert_eq!(stat.requests, 2);
        assert_eq!(stat.blocked, 0);
        assert_eq!(stat.last_seen, at(0, 10));

        let hourly = analytics.hourly_stats();
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].hour_start, at(0, 0));
        assert_eq!(hourly[0].allowed, 2);
        assert_eq!(hourly[0].total, 2);
    }

    #[test]
    fn test_top_ips_orders_by_requests() {
        let analytics = Analytics::new();
        for _ in 0..3 {
            analytics.record_request("A", "ua", false);
        }
        for _ in 0..5 {
            analytics.record_request("B", "ua", true);
        }

        let top = analytics.top_ips(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].ip, "B");
        assert_eq!(top[0].blocked, 5);

        let all = analytics.top_ips(10);
        assert_eq!(all.iter().map(|s| s.ip.as_str()).collect::<Vec<_>>(), vec!["B", "A"]);
    }

    #[test]
    fn test_top_user_agents_and_summary() {
        let analytics = Analytics::new();
        analytics.record_request("A", "curl", false);
        analytics.record_request("B", "curl", true);
        analytics.record_request("C", "", false);

        let agents = analytics.top_user_agents(5);
        assert_eq!(agents[0].user_agent, "curl");
        assert_eq!(agents[0].requests, 2);
        assert_eq!(agents[1].user_agent, "");

        let summary = analytics.summary();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.total_blocked, 1);
        assert_eq!(summary.total_allowed, 2);
        assert_eq!(summary.unique_ips, 3);
        assert_eq!(summary.unique_user_agents, 2);
    }

    #[test]
    fn test_history_keeps_last_24_hours() {
        let analytics = Analytics::new();
        for hour in 0..30 {
            analytics.record_request_at("A", "ua", hour % 2 == 0, at(hour, 0));
        }

        let hourly = analytics.hourly_stats();
        assert_eq!(hourly.len(), HOURLY_HISTORY);
        assert_eq!(hourly.first().unwrap().hour_start, at(6, 0));
        assert_eq!(hourly.last().unwrap().hour_start, at(29, 0));
        assert!(hourly.windows(2).all(|w| w[0].hour_start < w[1].hour_start));

        // A late record for an hour that already rotated out is ignored.
        analytics.record_request_at("A", "ua", false, at(1, 0));
        assert_eq!(analytics.hourly_stats().first().unwrap().hour_start, at(6, 0));
    }

    #[test]
    fn test_sparse_hours_keep_their_buckets() {
        let analytics = Analytics::new();
        analytics.record_request_at("A", "ua", true, at(0, 0));
        analytics.record_request_at("A", "ua", false, at(5, 0));
        analytics.record_request_at("A", "ua", false, at(29, 0));

        let hourly = analytics.hourly_stats();
        assert_eq!(hourly.len(), 3);
        assert_eq!(hourly[0].hour_start, at(0, 0));
        assert_eq!(hourly[0].blocked, 1);
        assert_eq!(hourly[1].hour_start, at(5, 0));
        assert_eq!(hourly[2].hour_start, at(29, 0));
        assert_eq!(hourly[2].allowed, 1);
    }

    #[test]
    fn test_late_record_counts_into_held_hour() {
        let analytics = Analytics::new();
        analytics.record_request_at("A", "ua", false, at(0, 10));
        analytics.record_request_at("A", "ua", false, at(3, 0));
        analytics.record_request_at("A", "ua", true, at(0, 50));

        let hourly = analytics.hourly_stats();
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly[0].total, 2);
        assert_eq!(hourly[0].blocked, 1);
        assert_eq!(hourly[1].total, 1);
    }

    #[test]
    fn test_clear() {
        let analytics = Analytics::new();
        analytics.record_request("A", "ua", true);
        analytics.clear();

        assert_eq!(analytics.summary().total_requests, 0);
        assert!(analytics.top_ips(10).is_empty());
        assert!(analytics.hourly_stats().is_empty());
    }
}
