//! Pattern-based threat rules for the firewall.
//!
//! Rules run in a fixed order and the first match decides the reported reason.
//! Only the forbidden-suffix rule has a side effect: it bans the client.

use std::time::Duration;

use url::form_urlencoded;

use crate::core::ban_store::BanStore;
use crate::core::Detection;
use crate::models::{AttackType, Decision, FirewallRequest, SecuritySettings};
use crate::utils::{contains_ignore_case, starts_with_ignore_case};

pub const SQL_INJECTION_REASON: &str = "SQL injection attempt detected";
pub const XSS_REASON: &str = "XSS attempt detected";

/// Threat rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatRule {
    ForbiddenSuffix,
    SqlInjection,
    Xss,
    Scanner,
    Bot,
    ProtectedDirectory,
}

impl ThreatRule {
    pub const ORDER: [ThreatRule; 6] = [
        ThreatRule::ForbiddenSuffix,
        ThreatRule::SqlInjection,
        ThreatRule::Xss,
        ThreatRule::Scanner,
        ThreatRule::Bot,
        ThreatRule::ProtectedDirectory,
    ];

    pub fn is_enabled(&self, settings: &SecuritySettings) -> bool {
        match self {
            ThreatRule::ForbiddenSuffix => settings.enable_suffix_protection,
            ThreatRule::SqlInjection => settings.enable_sql_protection,
            ThreatRule::Xss => settings.enable_xss_protection,
            ThreatRule::Scanner => settings.enable_scanner_protection,
            ThreatRule::Bot => settings.enable_bot_protection,
            ThreatRule::ProtectedDirectory => settings.enable_directory_protection,
        }
    }

    pub fn attack_type(&self) -> AttackType {
        match self {
            ThreatRule::ForbiddenSuffix => AttackType::MaliciousFile,
            ThreatRule::SqlInjection => AttackType::SqlInjection,
            ThreatRule::Xss => AttackType::Xss,
            ThreatRule::Scanner => AttackType::Scanner,
            ThreatRule::Bot => AttackType::Bot,
            ThreatRule::ProtectedDirectory => AttackType::DirectoryTraversal,
        }
    }
}

/// Lowercased views of the request shared by every rule.
struct Inspected<'a> {
    request: &'a FirewallRequest,
    path: String,
    user_agent: String,
    parameters: Option<Vec<String>>,
}

impl<'a> Inspected<'a> {
    fn new(request: &'a FirewallRequest) -> Self {
        Self {
            request,
            path: request.path.to_lowercase(),
            user_agent: request.user_agent.to_lowercase(),
            parameters: None,
        }
    }

    /// Decoded query values, then form values for POST-like methods.
    fn parameters(&mut self) -> &[String] {
        let request = self.request;
        self.parameters.get_or_insert_with(|| {
            let query = form_urlencoded::parse(request.query.as_bytes())
                .map(|(_, value)| value.to_lowercase());
            let form: Vec<String> = if request.is_post_like() {
                request.form.iter().map(|(_, value)| value.to_lowercase()).collect()
            } else {
                Vec::new()
            };
            query.chain(form).collect()
        })
    }
}

/// Stateless evaluator of the configured threat patterns.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate the temporary-ban check and then every enabled rule.
    ///
    /// Returns the first blocking detection, or `None` when the request is clean.
    pub fn evaluate_request(
        &self,
        request: &FirewallRequest,
        settings: &SecuritySettings,
        bans: &BanStore,
    ) -> Option<Detection> {
        if let Some(reason) = bans.is_banned(&request.client_ip) {
            return Some(Detection::from(Decision::block(format!(
                "temporarily banned: {}",
                reason
            ))));
        }

        let mut inspected = Inspected::new(request);
        for rule in ThreatRule::ORDER {
            if !rule.is_enabled(settings) {
                continue;
            }
            if let Some(reason) = self.match_rule(rule, &mut inspected, settings) {
                let decision = Decision::attack(reason, rule.attack_type());
                if rule != ThreatRule::ForbiddenSuffix {
                    return Some(Detection::from(decision));
                }

                let duration = Duration::from_secs(settings.suffix_ban_duration.saturating_mul(3600));
                let ban = bans.add(&request.client_ip, &decision.reason, duration);
                return Some(Detection {
                    decision,
                    ban: Some((ban, duration)),
                });
            }
        }

        None
    }

    fn match_rule(
        &self,
        rule: ThreatRule,
        inspected: &mut Inspected<'_>,
        settings: &SecuritySettings,
    ) -> Option<String> {
        match rule {
            ThreatRule::ForbiddenSuffix => {
                first_pattern(&settings.forbidden_suffixes, |s| contains_ignore_case(&inspected.path, s))
                    .map(|suffix| format!("Forbidden suffix detected: {}", suffix))
            }
            ThreatRule::SqlInjection => any_parameter_matches(inspected.parameters(), &settings.sql_keywords)
                .then(|| SQL_INJECTION_REASON.to_string()),
            ThreatRule::Xss => any_parameter_matches(inspected.parameters(), &settings.xss_patterns)
                .then(|| XSS_REASON.to_string()),
            ThreatRule::Scanner => {
                first_pattern(&settings.scanner_paths, |p| starts_with_ignore_case(&inspected.path, p))
                    .map(|prefix| format!("Scanner attempt detected: {}", prefix))
            }
            ThreatRule::Bot => first_pattern(&settings.suspicious_user_agents, |s| {
                contains_ignore_case(&inspected.user_agent, s)
            })
            .map(|agent| format!("Suspicious bot detected: {}", agent)),
            ThreatRule::ProtectedDirectory => {
                first_pattern(&settings.protected_directories, |p| starts_with_ignore_case(&inspected.path, p))
                    .map(|dir| format!("Access to protected directory: {}", dir))
            }
        }
    }
}

/// First non-empty pattern satisfying `matches`. Empty entries would match
/// every request and are ignored.
fn first_pattern<'p>(patterns: &'p [String], matches: impl Fn(&str) -> bool) -> Option<&'p str> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .find(|p| matches(p))
}

fn any_parameter_matches(values: &[String], patterns: &[String]) -> bool {
    values
        .iter()
        .any(|value| first_pattern(patterns, |p| contains_ignore_case(value, p)).is_some())
}
