//! The decision pipeline and the administrative surface around it.
//!
//! [`Firewall::evaluate`] runs the filters in a fixed order and stops at the
//! first block:
//!
//! 1. firewall disabled: allow
//! 2. permanent block list
//! 3. IP allow list (when non-empty)
//! 4. user-agent allow list (when non-empty)
//! 5. rate limiter
//! 6. DDoS detector
//! 7. threat rules, starting with the temporary-ban check
//!
//! Bans are created inside the filter that detects the abuse, before the
//! pipeline returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use log::{error, info};
use metrics::increment_counter;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{ConfigStore, PersistedState, StoreError};
use crate::core::analytics::Analytics;
use crate::core::ban_store::{BanStore, BAN_SWEEP_INTERVAL};
use crate::core::ddos_detector::{DdosDetector, HISTORY_SWEEP_INTERVAL};
use crate::core::events::EventSink;
use crate::core::rate_limiter::RateLimiter;
use crate::core::rule_engine::RuleEngine;
use crate::core::Detection;
use crate::models::{Decision, FirewallRequest, PolicyConfig, TemporaryBan};
use crate::utils::contains_ignore_case;

pub const PERMANENT_BAN_REASON: &str = "permanently banned";
pub const NOT_ALLOWED_REASON: &str = "not in allow list";
pub const USER_AGENT_NOT_ALLOWED_REASON: &str = "user agent not in allow list";
pub const RATE_LIMITED_REASON: &str = "rate limit exceeded";

/// Overview of the live configuration for the admin surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirewallStatus {
    pub firewall_enabled: bool,
    pub logging_enabled: bool,
    pub rate_limit: u32,
    pub banned_ips: usize,
    pub allowed_ips: usize,
    pub allowed_user_agents: usize,
    pub temporary_bans: usize,
    pub rate_limited_clients: usize,
}

pub struct Firewall {
    /// Current policy snapshot; replaced whole, never edited in place
    policy: ArcSwap<PolicyConfig>,
    /// Serialises administrative read-modify-write cycles on the policy
    admin_lock: Mutex<()>,
    rate_limiter: RateLimiter,
    ddos_detector: DdosDetector,
    rule_engine: RuleEngine,
    bans: BanStore,
    analytics: Analytics,
    events: Arc<dyn EventSink>,
    store: Arc<dyn ConfigStore>,
}

impl Firewall {
    pub fn new(state: PersistedState, events: Arc<dyn EventSink>, store: Arc<dyn ConfigStore>) -> Self {
        let bans = BanStore::new();
        bans.restore(state.temporary_bans);

        Self {
            rate_limiter: RateLimiter::new(state.policy.rate_limit),
            policy: ArcSwap::from_pointee(state.policy),
            admin_lock: Mutex::new(()),
            ddos_detector: DdosDetector::new(),
            rule_engine: RuleEngine::new(),
            bans,
            analytics: Analytics::new(),
            events,
            store,
        }
    }

    /// Build a firewall from whatever `store` holds, falling back to the default policy.
    pub fn load(events: Arc<dyn EventSink>, store: Arc<dyn ConfigStore>) -> Result<Self, StoreError> {
        let state = store.load()?.unwrap_or_default();
        info!(
            "Loaded policy: firewall {}, {} permanent bans, {} temporary bans",
            if state.policy.enable_firewall { "enabled" } else { "disabled" },
            state.policy.banned_ips.len(),
            state.temporary_bans.len()
        );
        Ok(Self::new(state, events, store))
    }

    /// Decide whether `request` may pass. Bans fire here; nothing is recorded.
    pub fn evaluate(&self, request: &FirewallRequest) -> Decision {
        let policy = self.policy.load_full();
        self.evaluate_with(&policy, request)
    }

    /// Evaluate `request`, then record the outcome and emit its events.
    pub fn handle(&self, request: &FirewallRequest) -> Decision {
        let policy = self.policy.load_full();
        let decision = self.evaluate_with(&policy, request);

        self.analytics
            .record_request(&request.client_ip, &request.user_agent, decision.blocked);

        if policy.enable_logging {
            self.events.record_decision(request, &decision);
        }

        if let Some(attack) = decision.attack {
            increment_counter!("firewall_attacks_total", "kind" => attack.as_str());
            self.events.record_attack(
                &request.client_ip,
                attack,
                &decision.reason,
                &request.user_agent,
                &request.url(),
            );
        }

        let outcome = if decision.blocked { "blocked" } else { "allowed" };
        increment_counter!("firewall_requests_total", "outcome" => outcome);

        decision
    }

    fn evaluate_with(&self, policy: &PolicyConfig, request: &FirewallRequest) -> Decision {
        if !policy.enable_firewall {
            return Decision::allow();
        }

        let ip = request.client_ip.as_str();

        if policy.banned_ips.contains(ip) {
            return Decision::block(PERMANENT_BAN_REASON);
        }

        if !policy.allowed_ips.is_empty() && !policy.allowed_ips.contains(ip) {
            return Decision::block(NOT_ALLOWED_REASON);
        }

        if !user_agent_allowed(policy, &request.user_agent) {
            return Decision::block(USER_AGENT_NOT_ALLOWED_REASON);
        }

        if !self.rate_limiter.allow(ip) {
            return Decision::block(RATE_LIMITED_REASON);
        }

        if let Some(detection) = self.ddos_detector.check(ip, &policy.security, &self.bans) {
            return self.apply(ip, detection, "ddos");
        }

        if let Some(detection) = self
            .rule_engine
            .evaluate_request(request, &policy.security, &self.bans)
        {
            return self.apply(ip, detection, "rule");
        }

        Decision::allow()
    }

    fn apply(&self, ip: &str, detection: Detection, source: &'static str) -> Decision {
        if let Some((ban, duration)) = &detection.ban {
            increment_counter!("firewall_bans_total", "source" => source);
            self.events.record_ban_created(ip, &ban.reason, *duration);
        }
        detection.decision
    }

    /// Current policy snapshot
    pub fn policy(&self) -> Arc<PolicyConfig> {
        self.policy.load_full()
    }

    /// Replace the whole policy and persist it on a best-effort basis
    pub fn update_policy(&self, policy: PolicyConfig) {
        let _guard = self.admin_lock.lock();
        self.install(policy);
        info!("Firewall policy updated");
    }

    fn modify_policy(&self, change: impl FnOnce(&mut PolicyConfig) -> bool) -> bool {
        let _guard = self.admin_lock.lock();
        let mut next = PolicyConfig::clone(&self.policy.load());
        let changed = change(&mut next);
        if changed {
            self.install(next);
        }
        changed
    }

    // Callers hold `admin_lock`.
    fn install(&self, policy: PolicyConfig) {
        self.rate_limiter.update_limit(policy.rate_limit);
        self.policy.store(Arc::new(policy));
        self.persist_best_effort();
    }

    /// Add `ip` to the permanent block list. Returns false if it was already there.
    pub fn ban_permanently(&self, ip: &str) -> bool {
        let added = self.modify_policy(|policy| policy.banned_ips.insert(ip.to_string()));
        if added {
            info!("IP banned: {}", ip);
        }
        added
    }

    pub fn unban_permanently(&self, ip: &str) -> bool {
        let removed = self.modify_policy(|policy| policy.banned_ips.remove(ip));
        if removed {
            info!("IP unbanned: {}", ip);
        }
        removed
    }

    /// Replace the user-agent allow list. Blank entries are dropped.
    pub fn set_allowed_user_agents(&self, agents: Vec<String>) {
        let agents: Vec<String> = agents
            .into_iter()
            .map(|agent| agent.trim().to_string())
            .filter(|agent| !agent.is_empty())
            .collect();
        self.modify_policy(|policy| {
            policy.allowed_user_agents = agents;
            true
        });
    }

    pub fn add_temporary_ban(&self, ip: &str, reason: &str, duration: Duration) -> TemporaryBan {
        let ban = self.bans.add(ip, reason, duration);
        increment_counter!("firewall_bans_total", "source" => "admin");
        self.events.record_ban_created(ip, reason, duration);
        self.persist_best_effort();
        ban
    }

    pub fn remove_temporary_ban(&self, ip: &str) -> bool {
        let removed = self.bans.remove(ip);
        if removed {
            info!("Temporary ban removed for IP: {}", ip);
            self.persist_best_effort();
        }
        removed
    }

    pub fn clear_temporary_bans(&self) -> usize {
        let count = self.bans.clear();
        info!("Cleared {} temporary bans", count);
        self.persist_best_effort();
        count
    }

    pub fn temporary_bans(&self) -> Vec<TemporaryBan> {
        self.bans.snapshot()
    }

    pub fn rate_limit_snapshot(&self) -> HashMap<String, usize> {
        self.rate_limiter.snapshot()
    }

    /// Forget the rate-limit window and abuse history of one client
    pub fn reset_client(&self, ip: &str) -> bool {
        let limited = self.rate_limiter.reset(ip);
        let tracked = self.ddos_detector.reset_detection(ip);
        if limited || tracked {
            info!("Request history reset for IP: {}", ip);
        }
        limited || tracked
    }

    /// Forget every rate-limit window and all abuse history
    pub fn clear_request_history(&self) -> usize {
        let count = self.rate_limiter.clear();
        self.ddos_detector.clear();
        info!("Cleared request history of {} clients", count);
        count
    }

    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    pub fn clear_stats(&self) {
        self.analytics.clear();
        info!("Statistics cleared");
    }

    pub fn status(&self) -> FirewallStatus {
        let policy = self.policy.load();
        FirewallStatus {
            firewall_enabled: policy.enable_firewall,
            logging_enabled: policy.enable_logging,
            rate_limit: self.rate_limiter.limit(),
            banned_ips: policy.banned_ips.len(),
            allowed_ips: policy.allowed_ips.len(),
            allowed_user_agents: policy.allowed_user_agents.len(),
            temporary_bans: self.bans.len(),
            rate_limited_clients: self.rate_limiter.snapshot().len(),
        }
    }

    /// Write the policy and live bans to the store
    pub fn persist(&self) -> Result<(), StoreError> {
        let state = PersistedState {
            policy: PolicyConfig::clone(&self.policy.load()),
            temporary_bans: self.bans.snapshot(),
        };
        self.store.persist(&state)
    }

    // The in-memory state stays authoritative when the store is unavailable.
    fn persist_best_effort(&self) {
        if let Err(e) = self.persist() {
            error!("Failed to persist firewall policy: {}", e);
        }
    }

    /// Drop expired temporary bans, persisting when anything changed
    pub fn sweep_expired_bans(&self) -> usize {
        let removed = self.bans.sweep();
        if removed > 0 {
            info!("Cleaned up {} expired temporary bans", removed);
            self.persist_best_effort();
        }
        removed
    }

    /// Trim the DDoS history to the configured window and drop idle rate-limit keys
    pub fn sweep_request_history(&self) -> usize {
        let window = Duration::from_secs(self.policy.load().security.ddos_time_window);
        self.rate_limiter.sweep();
        self.ddos_detector.sweep(window)
    }

    /// Start the periodic history and ban sweeps
    pub fn spawn_maintenance(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let history = {
            let firewall = Arc::clone(self);
            tokio::spawn(async move {
                let mut interval = time::interval(HISTORY_SWEEP_INTERVAL);
                loop {
                    interval.tick().await;
                    firewall.sweep_request_history();
                }
            })
        };

        let bans = {
            let firewall = Arc::clone(self);
            tokio::spawn(async move {
                let mut interval = time::interval(BAN_SWEEP_INTERVAL);
                loop {
                    interval.tick().await;
                    firewall.sweep_expired_bans();
                }
            })
        };

        vec![history, bans]
    }
}

fn user_agent_allowed(policy: &PolicyConfig, user_agent: &str) -> bool {
    let mut allowed = policy
        .allowed_user_agents
        .iter()
        .map(|agent| agent.trim())
        .filter(|agent| !agent.is_empty())
        .peekable();

    if allowed.peek().is_none() {
        return true;
    }

    let user_agent = user_agent.to_lowercase();
    allowed.any(|agent| contains_ignore_case(&user_agent, agent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::MockConfigStore;
    use crate::core::ddos_detector::ABUSE_REASON;
    use crate::core::events::MockEventSink;
    use crate::models::AttackType;

    fn quiet_sink() -> MockEventSink {
        let mut sink = MockEventSink::new();
        sink.expect_record_decision().returning(|_, _| ());
        sink.expect_record_ban_created().returning(|_, _, _| ());
        sink.expect_record_attack().returning(|_, _, _, _, _| ());
        sink
    }

    fn accepting_store() -> MockConfigStore {
        let mut store = MockConfigStore::new();
        store.expect_persist().returning(|_| Ok(()));
        store
    }

    fn firewall_with(policy: PolicyConfig, sink: MockEventSink, store: MockConfigStore) -> Firewall {
        let state = PersistedState {
            policy,
            temporary_bans: Vec::new(),
        };
        Firewall::new(state, Arc::new(sink), Arc::new(store))
    }

    fn firewall(policy: PolicyConfig) -> Firewall {
        firewall_with(policy, quiet_sink(), accepting_store())
    }

    fn request(ip: &str, path: &str) -> FirewallRequest {
        FirewallRequest::new(ip, "GET", path).with_user_agent("Mozilla/5.0")
    }

    #[test]
    fn test_disabled_firewall_allows_everything() {
        let mut policy = PolicyConfig::default();
        policy.enable_firewall = false;
        policy.banned_ips.insert("1.1.1.1".to_string());
        let firewall = firewall(policy);

        assert_eq!(firewall.evaluate(&request("1.1.1.1", "/x.php")), Decision::allow());
        assert!(firewall.temporary_bans().is_empty());
    }

    #[test]
    fn test_access_lists() {
        let mut policy = PolicyConfig::default();
        policy.banned_ips.insert("6.6.6.6".to_string());
        policy.allowed_ips.insert("1.1.1.1".to_string());
        policy.allowed_ips.insert("6.6.6.6".to_string());
        policy.allowed_user_agents = vec!["mozilla".to_string()];
        let firewall = firewall(policy);

        assert_eq!(firewall.evaluate(&request("6.6.6.6", "/")).reason, PERMANENT_BAN_REASON);
        assert_eq!(firewall.evaluate(&request("2.2.2.2", "/")).reason, NOT_ALLOWED_REASON);

        let curl = FirewallRequest::new("1.1.1.1", "GET", "/").with_user_agent("curl/8.0");
        assert_eq!(firewall.evaluate(&curl).reason, USER_AGENT_NOT_ALLOWED_REASON);

        let missing_agent = FirewallRequest::new("1.1.1.1", "GET", "/");
        assert_eq!(firewall.evaluate(&missing_agent).reason, USER_AGENT_NOT_ALLOWED_REASON);

        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
    }

    #[test]
    fn test_rate_limit_precedes_abuse_detection() {
        let mut policy = PolicyConfig::default();
        policy.rate_limit = 2;
        policy.security.ddos_threshold = 2;
        let firewall = firewall(policy);

        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);

        let third = firewall.evaluate(&request("1.1.1.1", "/"));
        assert_eq!(third.reason, RATE_LIMITED_REASON);
        assert!(third.attack.is_none());
        assert!(firewall.temporary_bans().is_empty());
    }

    #[test]
    fn test_abuse_creates_single_ban_and_event() {
        let mut policy = PolicyConfig::default();
        policy.security.ddos_threshold = 2;
        policy.security.ddos_ban_duration = 15;

        let mut sink = MockEventSink::new();
        sink.expect_record_ban_created()
            .withf(|ip, reason, duration| {
                ip == "1.1.1.1" && reason == ABUSE_REASON && *duration == Duration::from_secs(15 * 60)
            })
            .times(1)
            .returning(|_, _, _| ());
        let firewall = firewall_with(policy, sink, accepting_store());

        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);

        let decision = firewall.evaluate(&request("1.1.1.1", "/"));
        assert_eq!(decision.reason, ABUSE_REASON);
        assert_eq!(decision.attack, Some(AttackType::Ddos));

        let bans = firewall.temporary_bans();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].reason, ABUSE_REASON);
    }

    #[test]
    fn test_abusive_banned_client_reports_abuse() {
        let mut policy = PolicyConfig::default();
        policy.security.ddos_threshold = 1;
        let firewall = firewall(policy);

        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
        assert_eq!(firewall.evaluate(&request("1.1.1.1", "/")).reason, ABUSE_REASON);
        // Still over the threshold: the DDoS layer answers before the ban check.
        assert_eq!(firewall.evaluate(&request("1.1.1.1", "/")).reason, ABUSE_REASON);
        assert_eq!(firewall.temporary_bans().len(), 1);
    }

    #[test]
    fn test_suffix_ban_blocks_follow_up_requests() {
        let firewall = firewall(PolicyConfig::default());

        let first = firewall.evaluate(&request("1.1.1.1", "/x.php"));
        assert!(first.reason.contains("Forbidden suffix"));

        let second = firewall.evaluate(&request("1.1.1.1", "/index.html"));
        assert_eq!(second.reason, "temporarily banned: Forbidden suffix detected: .php");
        assert!(second.attack.is_none());

        assert!(!firewall.evaluate(&request("2.2.2.2", "/index.html")).blocked);
    }

    #[test]
    fn test_handle_records_stats_and_events() {
        let mut sink = MockEventSink::new();
        sink.expect_record_decision().times(2).returning(|_, _| ());
        sink.expect_record_attack()
            .withf(|ip, attack, _, _, url| ip == "1.1.1.1" && *attack == AttackType::SqlInjection && url == "/q?id=1%20union")
            .times(1)
            .returning(|_, _, _, _, _| ());
        let firewall = firewall_with(PolicyConfig::default(), sink, accepting_store());

        assert!(!firewall.handle(&request("1.1.1.1", "/")).blocked);
        let blocked = firewall.handle(&request("1.1.1.1", "/q").with_query("id=1%20union"));
        assert!(blocked.blocked);

        let summary = firewall.analytics().summary();
        assert_eq!(summary.total_requests, 2);
        assert_eq!(summary.total_blocked, 1);
    }

    #[test]
    fn test_logging_disabled_skips_decision_events() {
        let mut policy = PolicyConfig::default();
        policy.enable_logging = false;

        let mut sink = MockEventSink::new();
        sink.expect_record_decision().times(0);
        let firewall = firewall_with(policy, sink, accepting_store());

        firewall.handle(&request("1.1.1.1", "/"));
        assert_eq!(firewall.analytics().summary().total_requests, 1);
    }

    #[test]
    fn test_update_policy_swaps_snapshot_and_limit() {
        let firewall = firewall(PolicyConfig::default());
        let before = firewall.policy();

        let mut next = PolicyConfig::default();
        next.rate_limit = 1;
        firewall.update_policy(next.clone());

        assert_eq!(before.rate_limit, 60);
        assert_eq!(*firewall.policy(), next);
        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
        assert_eq!(firewall.evaluate(&request("1.1.1.1", "/")).reason, RATE_LIMITED_REASON);
    }

    #[test]
    fn test_reset_client_restores_admission() {
        let mut policy = PolicyConfig::default();
        policy.rate_limit = 1;
        let firewall = firewall(policy);

        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
        assert_eq!(firewall.evaluate(&request("1.1.1.1", "/")).reason, RATE_LIMITED_REASON);
        assert!(!firewall.evaluate(&request("2.2.2.2", "/")).blocked);

        assert!(firewall.reset_client("1.1.1.1"));
        assert!(!firewall.reset_client("3.3.3.3"));
        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
        assert_eq!(firewall.evaluate(&request("2.2.2.2", "/")).reason, RATE_LIMITED_REASON);

        assert_eq!(firewall.clear_request_history(), 2);
        assert!(firewall.rate_limit_snapshot().is_empty());
        assert!(!firewall.evaluate(&request("2.2.2.2", "/")).blocked);
    }

    #[test]
    fn test_reset_client_forgets_abuse_history() {
        let mut policy = PolicyConfig::default();
        policy.security.ddos_threshold = 2;
        let firewall = firewall(policy);

        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
        firewall.reset_client("1.1.1.1");

        // Two fresh requests fit under the threshold again.
        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);
        assert_eq!(firewall.evaluate(&request("1.1.1.1", "/")).reason, ABUSE_REASON);
    }

    #[test]
    fn test_status_reports_effective_limit() {
        let firewall = firewall(PolicyConfig::default());
        assert_eq!(firewall.status().rate_limit, 60);

        let mut next = PolicyConfig::default();
        next.rate_limit = 5;
        firewall.update_policy(next);
        assert_eq!(firewall.status().rate_limit, 5);
    }

    #[test]
    fn test_failed_persist_keeps_memory_state() {
        let mut store = MockConfigStore::new();
        store.expect_persist().times(1).returning(|_| {
            Err(StoreError::Io {
                path: "firewall.json".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        });
        let firewall = firewall_with(PolicyConfig::default(), quiet_sink(), store);

        assert!(firewall.ban_permanently("6.6.6.6"));
        assert!(firewall.policy().banned_ips.contains("6.6.6.6"));
        assert_eq!(firewall.evaluate(&request("6.6.6.6", "/")).reason, PERMANENT_BAN_REASON);
    }

    #[test]
    fn test_permanent_ban_round_trip() {
        let mut store = MockConfigStore::new();
        store.expect_persist().times(2).returning(|_| Ok(()));
        let firewall = firewall_with(PolicyConfig::default(), quiet_sink(), store);

        assert!(firewall.ban_permanently("6.6.6.6"));
        assert!(!firewall.ban_permanently("6.6.6.6"));
        assert!(firewall.unban_permanently("6.6.6.6"));
        assert!(!firewall.unban_permanently("6.6.6.6"));
        assert!(!firewall.evaluate(&request("6.6.6.6", "/")).blocked);
    }

    #[test]
    fn test_temporary_ban_administration() {
        let firewall = firewall(PolicyConfig::default());

        firewall.add_temporary_ban("1.1.1.1", "manual", Duration::from_secs(600));
        firewall.add_temporary_ban("2.2.2.2", "manual", Duration::from_secs(600));
        assert_eq!(firewall.evaluate(&request("1.1.1.1", "/")).reason, "temporarily banned: manual");

        assert!(firewall.remove_temporary_ban("1.1.1.1"));
        assert!(!firewall.evaluate(&request("1.1.1.1", "/")).blocked);

        assert_eq!(firewall.clear_temporary_bans(), 1);
        assert_eq!(firewall.status().temporary_bans, 0);
    }

    #[test]
    fn test_user_agent_list_is_normalised() {
        let firewall = firewall(PolicyConfig::default());
        firewall.set_allowed_user_agents(vec![" Mozilla ".to_string(), "".to_string()]);

        assert_eq!(firewall.policy().allowed_user_agents, vec!["Mozilla".to_string()]);
        assert_eq!(firewall.status().allowed_user_agents, 1);
    }

    #[actix_rt::test]
    async fn test_maintenance_sweeps_expired_bans() {
        let mut store = MockConfigStore::new();
        store.expect_persist().times(1).returning(|_| Ok(()));
        let firewall = Arc::new(firewall_with(PolicyConfig::default(), quiet_sink(), store));
        let past = chrono::Utc::now() - chrono::Duration::hours(1);
        firewall.bans.add_at("1.1.1.1", "stale", Duration::from_secs(60), past);

        let handles = firewall.spawn_maintenance();
        time::sleep(Duration::from_millis(50)).await;

        assert!(firewall.bans.is_empty());
        for handle in handles {
            handle.abort();
        }
    }

    #[test]
    fn test_persisted_bans_are_restored() {
        let state = PersistedState {
            policy: PolicyConfig::default(),
            temporary_bans: vec![TemporaryBan {
                ip: "1.1.1.1".to_string(),
                reason: "restored".to_string(),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            }],
        };
        let firewall = Firewall::new(state, Arc::new(quiet_sink()), Arc::new(accepting_store()));

        assert_eq!(firewall.evaluate(&request("1.1.1.1", "/")).reason, "temporarily banned: restored");
    }
}
