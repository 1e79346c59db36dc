//! Side-effect events emitted by the firewall.
//!
//! The default sink writes through the `log` facade under dedicated targets so
//! access, attack and ban lines can be routed separately with `RUST_LOG`.

use std::time::Duration;

use log::{info, warn};

use crate::models::{AttackType, Decision, FirewallRequest};

pub const ACCESS_TARGET: &str = "firewall::access";
pub const ATTACK_TARGET: &str = "firewall::attack";
pub const BAN_TARGET: &str = "firewall::ban";

const MAX_FORM_VALUE_LEN: usize = 100;

const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "pass",
    "token",
    "secret",
    "key",
    "auth",
    "credit",
    "card",
    "cvv",
    "ssn",
];

/// Receiver of decision, ban and attack events.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn record_decision(&self, request: &FirewallRequest, decision: &Decision);

    fn record_ban_created(&self, ip: &str, reason: &str, duration: Duration);

    fn record_attack(&self, ip: &str, attack: AttackType, detail: &str, user_agent: &str, url: &str);
}

/// Event sink backed by the `log` facade
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn record_decision(&self, request: &FirewallRequest, decision: &Decision) {
        let mut line = format!(
            "{} {} {} \"{}\"",
            request.client_ip,
            request.method,
            request.url(),
            request.user_agent
        );

        if decision.blocked {
            line.push_str(&format!(" - BLOCKED (403) - REASON: {}", decision.reason));
        } else {
            line.push_str(" - ALLOWED");
        }

        if request.is_post_like() && !request.form.is_empty() {
            line.push_str(" - POST: ");
            line.push_str(&summarize_form(&request.form));
        }

        info!(target: ACCESS_TARGET, "{}", line);
    }

    fn record_ban_created(&self, ip: &str, reason: &str, duration: Duration) {
        warn!(
            target: BAN_TARGET,
            "TEMP_BAN - IP: {} - Duration: {}s - Reason: {}",
            ip,
            duration.as_secs(),
            reason
        );
    }

    fn record_attack(&self, ip: &str, attack: AttackType, detail: &str, user_agent: &str, url: &str) {
        warn!(
            target: ATTACK_TARGET,
            "ATTACK - Type: {} - IP: {} - URL: {} - UA: \"{}\" - Details: {}",
            attack,
            ip,
            url,
            user_agent,
            detail
        );
    }
}

pub fn is_sensitive_field(name: &str) -> bool {
    let name = name.to_lowercase();
    SENSITIVE_FIELDS.iter().any(|field| name.contains(field))
}

/// Render form pairs for a log line, hiding credentials and truncating long values.
pub fn summarize_form(form: &[(String, String)]) -> String {
    form.iter()
        .map(|(name, value)| {
            if is_sensitive_field(name) {
                format!("{}=[HIDDEN]", name)
            } else if value.chars().count() > MAX_FORM_VALUE_LEN {
                let truncated: String = value.chars().take(MAX_FORM_VALUE_LEN).collect();
                format!("{}={}...", name, truncated)
            } else {
                format!("{}={}", name, value)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}
