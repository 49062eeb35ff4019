//! URL Validator (§4.1).
//!
//! `IsValidURL(raw) -> (normalized, ok)` is a pure function of
//! `(raw_url, whitelist, blacklist, allow_private, allow_loopback,
//! skip_dns, dns_cache, domain_cache)`. Rejections are logged once at
//! debug level and never propagate as an error — callers simply
//! discard the URL.

use crate::normalize::normalize;
use dashmap::DashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

const DEFAULT_MAX_URL_LENGTH: usize = 2048;
const DEFAULT_DNS_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub max_url_length: usize,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    pub allow_private: bool,
    pub allow_loopback: bool,
    pub skip_dns: bool,
    pub dns_cache_ttl: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            allow_private: false,
            allow_loopback: false,
            skip_dns: false,
            dns_cache_ttl: DEFAULT_DNS_CACHE_TTL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DomainDecision {
    Allowed,
    Rejected,
}

#[derive(Debug, Clone)]
struct DnsCacheEntry {
    addresses: Vec<IpAddr>,
    recorded_at: Instant,
    success: bool,
}

/// Validates and normalizes URLs per §4.1, caching domain decisions and
/// DNS lookups so repeated sightings of the same host are cheap.
pub struct UrlValidator {
    config: ValidatorConfig,
    domain_cache: DashMap<String, DomainDecision>,
    dns_cache: DashMap<String, DnsCacheEntry>,
}

impl UrlValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            domain_cache: DashMap::new(),
            dns_cache: DashMap::new(),
        }
    }

    /// Invalidates the cached accept/reject decision for every host —
    /// call this after a whitelist/blacklist rule change (§4.1).
    pub fn invalidate_domain_cache(&self) {
        self.domain_cache.clear();
    }

    /// Synchronous checks only: length, scheme, host, domain policy.
    /// Does not touch DNS. Used when the caller wants a fast-path
    /// rejection before spending an await point on resolution.
    pub fn validate_sync(&self, raw: &str) -> Option<String> {
        if raw.is_empty() || raw.len() > self.config.max_url_length {
            debug!(url = raw, reason = "length", "rejected URL");
            return None;
        }

        let normalized = normalize(raw)?;
        let parsed = Url::parse(&normalized).ok()?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            debug!(url = raw, reason = "scheme", "rejected URL");
            return None;
        }

        let host = parsed.host_str()?;
        if host.is_empty() {
            debug!(url = raw, reason = "empty host", "rejected URL");
            return None;
        }
        let host = host.trim_end_matches('.').to_lowercase();

        if self.domain_decision(&host) == DomainDecision::Rejected {
            debug!(url = raw, host, reason = "domain policy", "rejected URL");
            return None;
        }

        Some(normalized)
    }

    /// Full validation including the DNS / private-IP checks (§4.1).
    /// `resolve` performs the actual DNS lookup; injected so tests can
    /// avoid touching the network.
    pub async fn validate<F, Fut>(&self, raw: &str, resolve: F) -> (Option<String>, bool)
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = std::io::Result<Vec<IpAddr>>>,
    {
        let Some(normalized) = self.validate_sync(raw) else {
            return (None, false);
        };
        let Some(parsed) = Url::parse(&normalized).ok() else {
            return (None, false);
        };
        let host = parsed.host_str().unwrap_or_default().to_string();

        if self.config.skip_dns {
            return (Some(normalized), true);
        }

        if let Ok(literal) = host.parse::<IpAddr>() {
            if !self.ip_class_allowed(&[literal]) {
                debug!(url = raw, host, reason = "ip class", "rejected URL");
                return (None, false);
            }
            return (Some(normalized), true);
        }

        let addresses = match self.resolve_cached(&host, resolve).await {
            Some(addrs) if !addrs.is_empty() => addrs,
            _ => {
                debug!(url = raw, host, reason = "dns resolution failed", "rejected URL");
                return (None, false);
            }
        };

        if !self.ip_class_allowed(&addresses) {
            debug!(url = raw, host, reason = "ip class", "rejected URL");
            return (None, false);
        }

        (Some(normalized), true)
    }

    fn ip_class_allowed(&self, addresses: &[IpAddr]) -> bool {
        let all_loopback = addresses.iter().all(|a| a.is_loopback());
        if all_loopback && !self.config.allow_loopback {
            return false;
        }
        let all_private = addresses.iter().all(is_private_address);
        if all_private && !self.config.allow_private {
            return false;
        }
        true
    }

    async fn resolve_cached<F, Fut>(&self, host: &str, resolve: F) -> Option<Vec<IpAddr>>
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = std::io::Result<Vec<IpAddr>>>,
    {
        if let Some(entry) = self.dns_cache.get(host) {
            if entry.recorded_at.elapsed() < self.config.dns_cache_ttl {
                return if entry.success {
                    Some(entry.addresses.clone())
                } else {
                    None
                };
            }
        }

        let result = resolve(host.to_string()).await;
        let (addresses, success) = match result {
            Ok(addrs) if !addrs.is_empty() => (addrs, true),
            _ => (Vec::new(), false),
        };
        self.dns_cache.insert(
            host.to_string(),
            DnsCacheEntry {
                addresses: addresses.clone(),
                recorded_at: Instant::now(),
                success,
            },
        );
        if success {
            Some(addresses)
        } else {
            None
        }
    }

    fn domain_decision(&self, host: &str) -> DomainDecision {
        if let Some(cached) = self.domain_cache.get(host) {
            return *cached;
        }
        let decision = self.compute_domain_decision(host);
        self.domain_cache.insert(host.to_string(), decision);
        decision
    }

    fn compute_domain_decision(&self, host: &str) -> DomainDecision {
        if self
            .config
            .blacklist
            .iter()
            .any(|pattern| domain_matches(host, pattern))
        {
            return DomainDecision::Rejected;
        }
        if self.config.whitelist.is_empty() {
            return DomainDecision::Allowed;
        }
        if self
            .config
            .whitelist
            .iter()
            .any(|pattern| domain_matches(host, pattern))
        {
            DomainDecision::Allowed
        } else {
            DomainDecision::Rejected
        }
    }
}

/// Matches `host` against `pattern`, supporting exact match, subdomain
/// match, and an explicit `*.domain` wildcard (§4.1).
fn domain_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    if let Some(root) = pattern.strip_prefix("*.") {
        return host == root || host.ends_with(&format!(".{root}"));
    }
    host == pattern || host.ends_with(&format!(".{pattern}"))
}

fn is_private_address(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            // Unique local addresses (fc00::/7) are the IPv6 analogue of RFC1918.
            (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn validator(config: ValidatorConfig) -> UrlValidator {
        UrlValidator::new(config)
    }

    #[test]
    fn rejects_empty_and_overlong_urls() {
        let v = validator(ValidatorConfig::default());
        assert_eq!(v.validate_sync(""), None);
        let long = format!("https://a.test/{}", "x".repeat(3000));
        assert_eq!(v.validate_sync(&long), None);
    }

    #[test]
    fn rejects_non_http_schemes() {
        let v = validator(ValidatorConfig::default());
        assert_eq!(v.validate_sync("ftp://a.test/file"), None);
        assert_eq!(v.validate_sync("javascript:alert(1)"), None);
    }

    #[test]
    fn blacklist_rejects_exact_and_subdomain() {
        let v = validator(ValidatorConfig {
            blacklist: vec!["evil.test".into()],
            ..Default::default()
        });
        assert_eq!(v.validate_sync("https://evil.test/x"), None);
        assert_eq!(v.validate_sync("https://sub.evil.test/x"), None);
        assert!(v.validate_sync("https://good.test/x").is_some());
    }

    #[test]
    fn empty_whitelist_means_accept_all_not_blacklisted() {
        let v = validator(ValidatorConfig::default());
        assert!(v.validate_sync("https://anything.test/x").is_some());
    }

    #[test]
    fn nonempty_whitelist_accepts_only_matches() {
        let v = validator(ValidatorConfig {
            whitelist: vec!["good.test".into()],
            ..Default::default()
        });
        assert!(v.validate_sync("https://good.test/x").is_some());
        assert!(v.validate_sync("https://sub.good.test/x").is_some());
        assert_eq!(v.validate_sync("https://other.test/x"), None);
    }

    #[test]
    fn wildcard_blacklist_pattern() {
        let v = validator(ValidatorConfig {
            blacklist: vec!["*.evil.test".into()],
            ..Default::default()
        });
        assert_eq!(v.validate_sync("https://sub.evil.test/x"), None);
        assert!(v.validate_sync("https://evil.test/x").is_some());
    }

    #[tokio::test]
    async fn dns_failure_rejects() {
        let v = validator(ValidatorConfig::default());
        let (result, ok) = v
            .validate("https://nowhere.test/x", |_| async {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "no such host"))
            })
            .await;
        assert!(!ok);
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn private_ip_rejected_unless_allowed() {
        let v = validator(ValidatorConfig::default());
        let (result, ok) = v
            .validate("https://intranet.test/x", |_| async {
                Ok(vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))])
            })
            .await;
        assert!(!ok);
        assert_eq!(result, None);

        let v2 = validator(ValidatorConfig {
            allow_private: true,
            ..Default::default()
        });
        let (result2, ok2) = v2
            .validate("https://intranet.test/x", |_| async {
                Ok(vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))])
            })
            .await;
        assert!(ok2);
        assert!(result2.is_some());
    }

    #[tokio::test]
    async fn skip_dns_bypasses_resolution() {
        let v = validator(ValidatorConfig {
            skip_dns: true,
            ..Default::default()
        });
        let (result, ok) = v
            .validate("https://anything.test/x", |_| async {
                panic!("resolve should not be called when skip_dns is set")
            })
            .await;
        assert!(ok);
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn raw_ip_literal_bypasses_dns_but_not_ip_filtering() {
        let v = validator(ValidatorConfig::default());
        let (result, ok) = v
            .validate("https://127.0.0.1/x", |_| async {
                panic!("resolve should not be called for IP literals")
            })
            .await;
        assert!(!ok);
        assert_eq!(result, None);
    }

    #[test]
    fn domain_cache_invalidation_recomputes_after_rule_change() {
        let v = validator(ValidatorConfig {
            blacklist: vec!["evil.test".into()],
            ..Default::default()
        });
        assert_eq!(v.validate_sync("https://evil.test/x"), None);
        // Simulate a rule change by constructing a new validator, but exercise
        // the invalidation path on the same instance first.
        v.invalidate_domain_cache();
        assert_eq!(v.domain_cache.len(), 0);
    }
}
