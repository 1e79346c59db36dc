use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Firewall listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Largest request body accepted for inspection and forwarding
    pub max_body_bytes: u64,
}

/// Administrative API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Admin API host
    pub host: String,
    /// Admin API port
    pub port: u16,
    /// Administrator login name
    pub username: String,
    /// Administrator password; logins are refused while unset
    #[serde(default)]
    pub password: Option<String>,
    /// Session lifetime in hours, renewed on every authenticated call
    pub session_ttl_hours: u64,
}

/// Upstream service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL allowed requests are forwarded to
    pub url: String,
    /// Timeout for a forwarded request in seconds
    pub timeout_seconds: u64,
}

/// Policy persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyStoreConfig {
    /// Path of the JSON file holding the policy and temporary bans
    pub file: String,
}

/// Metrics exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus exporter
    pub enabled: bool,
    /// Exporter listen address
    pub listen: String,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Firewall listener configuration
    pub server: ServerConfig,
    /// Administrative API configuration
    pub admin: AdminConfig,
    /// Upstream configuration
    pub upstream: UpstreamConfig,
    /// Policy persistence configuration
    pub policy_store: PolicyStoreConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                max_body_bytes: 64 * 1024 * 1024,
            },
            admin: AdminConfig {
                host: "127.0.0.1".to_string(),
                port: 9090,
                username: "admin".to_string(),
                password: None,
                session_ttl_hours: 24,
            },
            upstream: UpstreamConfig {
                url: "http://127.0.0.1:3000".to_string(),
                timeout_seconds: 30,
            },
            policy_store: PolicyStoreConfig {
                file: "firewall.json".to_string(),
            },
            metrics: MetricsConfig {
                enabled: false,
                listen: "127.0.0.1:9000".to_string(),
            },
        }
    }
}

/// Per-layer protection settings.
///
/// Every list is matched case-insensitively. Durations keep the units the
/// persisted policy file has always used: suffix bans in hours, the DDoS
/// window in seconds and DDoS bans in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub enable_suffix_protection: bool,
    pub forbidden_suffixes: Vec<String>,
    /// Hours
    pub suffix_ban_duration: u64,

    pub enable_sql_protection: bool,
    pub sql_keywords: Vec<String>,

    pub enable_xss_protection: bool,
    pub xss_patterns: Vec<String>,

    pub enable_scanner_protection: bool,
    pub scanner_paths: Vec<String>,

    pub enable_bot_protection: bool,
    pub suspicious_user_agents: Vec<String>,

    pub enable_directory_protection: bool,
    pub protected_directories: Vec<String>,

    pub enable_ddos_protection: bool,
    /// Requests per window
    pub ddos_threshold: u32,
    /// Seconds
    pub ddos_time_window: u64,
    /// Minutes
    pub ddos_ban_duration: u64,

    /// Carried in the policy shape only; no country lookup happens on the decision path.
    pub enable_geo_blocking: bool,
    pub blocked_countries: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            enable_suffix_protection: true,
            forbidden_suffixes: strings(&[".php", ".asp", ".aspx", ".jsp", ".cgi"]),
            suffix_ban_duration: 10,

            enable_sql_protection: true,
            sql_keywords: strings(&[
                "union", "select", "insert", "delete", "update", "drop", "create", "alter", "exec",
                "script",
            ]),

            enable_xss_protection: true,
            xss_patterns: strings(&[
                "<script",
                "javascript:",
                "onload=",
                "onerror=",
                "onclick=",
                "onmouseover=",
            ]),

            enable_scanner_protection: true,
            scanner_paths: strings(&[
                "/admin",
                "/wp-admin",
                "/phpmyadmin",
                "/cpanel",
                "/webmail",
                "/.env",
                "/config",
            ]),

            enable_bot_protection: true,
            suspicious_user_agents: strings(&[
                "bot", "crawler", "spider", "scraper", "scanner", "nikto", "sqlmap",
            ]),

            enable_directory_protection: true,
            protected_directories: strings(&["/.git", "/.svn", "/backup", "/config", "/logs", "/tmp"]),

            enable_ddos_protection: true,
            ddos_threshold: 100,
            ddos_time_window: 60,
            ddos_ban_duration: 30,

            enable_geo_blocking: false,
            blocked_countries: Vec::new(),
        }
    }
}

/// Snapshot of every tunable the decision pipeline reads.
///
/// Never mutated in place once published: administrative changes build a new
/// value and swap it in whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub enable_firewall: bool,
    /// Controls access logging of individual decisions
    pub enable_logging: bool,
    /// Requests per client per trailing 60 seconds
    #[serde(alias = "rate_limit_rps")]
    pub rate_limit: u32,
    pub banned_ips: BTreeSet<String>,
    pub allowed_ips: BTreeSet<String>,
    pub allowed_user_agents: Vec<String>,
    pub security: SecuritySettings,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enable_firewall: true,
            enable_logging: true,
            rate_limit: 60,
            banned_ips: BTreeSet::new(),
            allowed_ips: BTreeSet::new(),
            allowed_user_agents: Vec::new(),
            security: SecuritySettings::default(),
        }
    }
}

/// A time-limited denial for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryBan {
    pub ip: String,
    pub reason: String,
    pub expires_at: DateTime<Utc>,
}

impl TemporaryBan {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The request attributes the firewall evaluates.
///
/// Absent headers are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallRequest {
    pub client_ip: String,
    pub method: String,
    pub path: String,
    /// Raw, still percent-encoded query string without the leading `?`
    pub query: String,
    pub user_agent: String,
    /// Decoded form body pairs, populated for POST-like methods only
    pub form: Vec<(String, String)>,
}

impl FirewallRequest {
    pub fn new(client_ip: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            client_ip: client_ip.into(),
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
        self.form = form;
        self
    }

    /// Whether the method carries a form body worth inspecting.
    pub fn is_post_like(&self) -> bool {
        ["POST", "PUT", "PATCH"]
            .iter()
            .any(|m| self.method.eq_ignore_ascii_case(m))
    }

    /// Path plus query, as seen on the wire.
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// Attack classes reported to the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttackType {
    SqlInjection,
    Xss,
    Scanner,
    Ddos,
    Bot,
    MaliciousFile,
    DirectoryTraversal,
}

impl AttackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackType::SqlInjection => "SQL_INJECTION",
            AttackType::Xss => "XSS",
            AttackType::Scanner => "SCANNER",
            AttackType::Ddos => "DDOS",
            AttackType::Bot => "BOT",
            AttackType::MaliciousFile => "MALICIOUS_FILE",
            AttackType::DirectoryTraversal => "DIRECTORY_TRAVERSAL",
        }
    }
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub blocked: bool,
    pub reason: String,
    /// Set when the block was caused by a recognised attack pattern
    pub attack: Option<AttackType>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            blocked: false,
            reason: String::new(),
            attack: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: reason.into(),
            attack: None,
        }
    }

    pub fn attack(reason: impl Into<String>, attack: AttackType) -> Self {
        Self {
            attack: Some(attack),
            ..Self::block(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_accepts_partial_json() {
        let policy: PolicyConfig =
            serde_json::from_str(r#"{"rate_limit_rps": 5, "security": {"ddos_threshold": 7}}"#).unwrap();

        assert_eq!(policy.rate_limit, 5);
        assert_eq!(policy.security.ddos_threshold, 7);
        assert!(policy.enable_firewall);
        assert_eq!(policy.security.forbidden_suffixes, SecuritySettings::default().forbidden_suffixes);
    }

    #[test]
    fn test_post_like_methods() {
        assert!(FirewallRequest::new("1.1.1.1", "post", "/").is_post_like());
        assert!(FirewallRequest::new("1.1.1.1", "PATCH", "/").is_post_like());
        assert!(!FirewallRequest::new("1.1.1.1", "GET", "/").is_post_like());
    }

    #[test]
    fn test_url_includes_query() {
        let request = FirewallRequest::new("1.1.1.1", "GET", "/search").with_query("q=1");
        assert_eq!(request.url(), "/search?q=1");
        assert_eq!(FirewallRequest::new("1.1.1.1", "GET", "/").url(), "/");
    }
}
