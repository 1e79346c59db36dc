//! Core functionality for the firewall.
//!
//! This module contains the stateful filters that jointly decide whether a
//! request is admitted: rate limiting, DDoS detection, threat rules and the
//! temporary ban store, plus the analytics fed by every decision.

pub mod analytics;
pub mod ban_store;
pub mod ddos_detector;
pub mod events;
pub mod firewall;
pub mod rate_limiter;
pub mod rule_engine;

use std::time::Duration;

use crate::models::{Decision, TemporaryBan};

/// A blocking result from one filter, with the ban it created if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub decision: Decision,
    pub ban: Option<(TemporaryBan, Duration)>,
}

impl From<Decision> for Detection {
    fn from(decision: Decision) -> Self {
        Self { decision, ban: None }
    }
}

pub use analytics::Analytics;
pub use ban_store::BanStore;
pub use ddos_detector::DdosDetector;
pub use events::{EventSink, LogEventSink};
pub use firewall::{Firewall, FirewallStatus};
pub use rate_limiter::RateLimiter;
pub use rule_engine::{RuleEngine, ThreatRule};
