//! Connection gate
//!
//! Admission control that runs on the upgrade request, before any process
//! or session resource exists. A request is admitted only when its `Host`
//! (and its `Origin`, when the browser sends one) names an allowlisted host.

use std::collections::HashSet;

use axum::http::uri::{Authority, Uri};
use cs_core::AdmissionDenied;

/// Case-insensitive set of hostnames allowed to open sessions
#[derive(Debug, Clone)]
pub struct HostAllowlist {
    hosts: HashSet<String>,
}

impl HostAllowlist {
    /// Build an allowlist from configured hostnames
    ///
    /// Entries are normalized the same way request hosts are, so a
    /// configured `LOCALHOST:8261` still matches `localhost`.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .filter_map(|h| normalize_host(h.as_ref()))
            .collect();
        Self { hosts }
    }

    /// Check a single host against the allowlist
    pub fn validate(&self, host: &str) -> Result<(), AdmissionDenied> {
        match normalize_host(host) {
            Some(normalized) if self.hosts.contains(&normalized) => Ok(()),
            _ => Err(AdmissionDenied {
                host: host.to_string(),
            }),
        }
    }

    /// Check the `Host` and `Origin` header values of an upgrade request
    ///
    /// A missing `Host` is denied. A present `Origin` must also be allowed.
    pub fn admit(&self, host: Option<&str>, origin: Option<&str>) -> Result<(), AdmissionDenied> {
        let host = host.ok_or_else(|| AdmissionDenied {
            host: String::new(),
        })?;
        self.validate(host)?;

        if let Some(origin) = origin {
            let origin_host = origin
                .parse::<Uri>()
                .ok()
                .and_then(|uri| uri.host().map(str::to_string))
                .ok_or_else(|| AdmissionDenied {
                    host: origin.to_string(),
                })?;
            self.validate(&origin_host).map_err(|_| AdmissionDenied {
                host: origin.to_string(),
            })?;
        }

        Ok(())
    }

    /// Number of distinct allowed hosts
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Check if nothing is allowed
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Reduce `host[:port]` to a lowercase hostname
///
/// Strips the port and IPv6 brackets. Returns `None` for values that are
/// not a valid authority (userinfo, paths, empty).
fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains('@') {
        return None;
    }

    let host = match raw.parse::<Authority>() {
        Ok(authority) => authority.host().to_string(),
        // Bare IPv6 addresses are not valid authorities without brackets
        Err(_) if raw.contains(':') && raw.parse::<std::net::Ipv6Addr>().is_ok() => {
            raw.to_string()
        }
        Err(_) => return None,
    };

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost_only() -> HostAllowlist {
        HostAllowlist::new(["localhost"])
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("localhost"), Some("localhost".into()));
        assert_eq!(normalize_host("LocalHost:8261"), Some("localhost".into()));
        assert_eq!(normalize_host("[::1]:8261"), Some("::1".into()));
        assert_eq!(normalize_host("::1"), Some("::1".into()));
        assert_eq!(normalize_host(""), None);
        assert_eq!(normalize_host("user@localhost"), None);
    }

    #[test]
    fn test_exact_match_only() {
        let gate = localhost_only();
        assert!(gate.validate("localhost").is_ok());
        assert!(gate.validate("localhost:8261").is_ok());
        assert!(gate.validate("LOCALHOST").is_ok());

        assert!(gate.validate("evil.com").is_err());
        assert!(gate.validate("localhost.evil.com").is_err());
        assert!(gate.validate("sub.localhost").is_err());
    }

    #[test]
    fn test_denied_reports_host() {
        let gate = localhost_only();
        let denied = gate.validate("evil.com").unwrap_err();
        assert_eq!(denied.host, "evil.com");
    }

    #[test]
    fn test_missing_host_denied() {
        let gate = localhost_only();
        assert!(gate.admit(None, None).is_err());
    }

    #[test]
    fn test_origin_must_also_match() {
        let gate = localhost_only();
        assert!(gate
            .admit(Some("localhost:8261"), Some("http://localhost:8261"))
            .is_ok());
        assert!(gate
            .admit(Some("localhost:8261"), Some("https://evil.com"))
            .is_err());
        assert!(gate.admit(Some("localhost"), Some("null")).is_err());
    }

    #[test]
    fn test_multiple_hosts() {
        let gate = HostAllowlist::new(["localhost", "Shell.Example.com", "[::1]"]);
        assert_eq!(gate.len(), 3);
        assert!(gate.validate("shell.example.com:443").is_ok());
        assert!(gate.validate("[::1]:8261").is_ok());
        assert!(gate.validate("example.com").is_err());
    }

    #[test]
    fn test_empty_allowlist_denies_everything() {
        let gate = HostAllowlist::new(Vec::<String>::new());
        assert!(gate.is_empty());
        assert!(gate.validate("localhost").is_err());
    }
}
