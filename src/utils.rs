use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn get_current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Resolve the client identity for a request.
///
/// The first `X-Forwarded-For` hop wins, then `X-Real-IP`, then the peer
/// address. Returns an empty string when nothing is known.
pub fn resolve_client_ip(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer: Option<IpAddr>,
) -> String {
    if let Some(first) = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
    {
        return first.to_string();
    }

    if let Some(real) = real_ip.map(str::trim).filter(|ip| !ip.is_empty()) {
        return real.to_string();
    }

    peer.map(|ip| ip.to_string()).unwrap_or_default()
}

/// Case-insensitive substring test against an already lowercased haystack.
pub fn contains_ignore_case(haystack_lower: &str, needle: &str) -> bool {
    haystack_lower.contains(&needle.to_lowercase())
}

/// Case-insensitive prefix test against an already lowercased haystack.
pub fn starts_with_ignore_case(haystack_lower: &str, prefix: &str) -> bool {
    haystack_lower.starts_with(&prefix.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_for_wins() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            resolve_client_ip(Some("203.0.113.7, 10.0.0.2"), Some("198.51.100.1"), Some(peer)),
            "203.0.113.7"
        );
    }

    #[test]
    fn test_falls_back_to_real_ip_then_peer() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(resolve_client_ip(None, Some("198.51.100.1"), Some(peer)), "198.51.100.1");
        assert_eq!(resolve_client_ip(Some(" "), None, Some(peer)), "10.0.0.1");
        assert_eq!(resolve_client_ip(None, None, None), "");
    }

    #[test]
    fn test_case_insensitive_helpers() {
        assert!(contains_ignore_case("/index.php", ".PHP"));
        assert!(starts_with_ignore_case("/wp-admin/setup", "/WP-ADMIN"));
        assert!(!starts_with_ignore_case("/public/wp-admin", "/wp-admin"));
    }
}
