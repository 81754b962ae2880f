//! Route planning: direct or through an upstream proxy.
//!
//! # Responsibilities
//! - Classify targets as local (always direct)
//! - Read `{scheme}.proxyHost` / `{scheme}.proxyPort` at decision time
//! - Honour `{scheme}.nonProxyHosts` bypass patterns
//!
//! # Design Decisions
//! - Fail open: missing or malformed upstream settings mean direct
//! - Nothing is cached; every decision reads the current properties

use std::fmt;
use std::sync::Arc;

use crate::config::{PropertySource, RoutingConfig};
use crate::routing::matcher::{AnyMatcher, Matcher};

/// Outcome of routing a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Direct,
    Upstream { host: String, port: u16 },
}

impl RouteDecision {
    pub fn is_direct(&self) -> bool {
        matches!(self, RouteDecision::Direct)
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RouteDecision::Direct => "direct",
            RouteDecision::Upstream { .. } => "upstream",
        }
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteDecision::Direct => f.write_str("direct"),
            RouteDecision::Upstream { host, port } => write!(f, "via {host}:{port}"),
        }
    }
}

/// Local/remote split evaluated before consulting upstream properties.
#[derive(Debug, Default)]
pub struct LocalClassifier {
    domains: AnyMatcher,
    ip_prefixes: AnyMatcher,
}

impl LocalClassifier {
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            domains: AnyMatcher::from_patterns(&config.local_domains),
            ip_prefixes: AnyMatcher::from_patterns(&config.local_ip_prefixes),
        }
    }

    pub fn is_local(&self, host: &str) -> bool {
        self.domains.matches(host) || self.ip_prefixes.matches(host)
    }
}

/// Decides per request whether to go direct or through an upstream proxy.
#[derive(Clone)]
pub struct RoutePlanner {
    properties: Arc<dyn PropertySource>,
}

impl RoutePlanner {
    pub fn new(properties: Arc<dyn PropertySource>) -> Self {
        Self { properties }
    }

    /// Route `target_host` for `scheme` (`http` or `https`).
    pub fn route(&self, target_host: &str, scheme: &str) -> RouteDecision {
        if self.matches_non_proxy(target_host, scheme) {
            return RouteDecision::Direct;
        }

        match self.upstream_for(scheme) {
            Some((host, port)) => {
                tracing::debug!(scheme, target_host, upstream = %host, port, "Routing via upstream");
                RouteDecision::Upstream { host, port }
            }
            None => RouteDecision::Direct,
        }
    }

    fn matches_non_proxy(&self, target_host: &str, scheme: &str) -> bool {
        let key = format!("{scheme}.nonProxyHosts");
        let Some(list) = self.lookup(&key) else {
            tracing::trace!(scheme, target_host, "No non-proxy hosts configured");
            return false;
        };

        let patterns = AnyMatcher::from_pipe_list(&list);
        match patterns.first_match(target_host) {
            Some(pattern) => {
                tracing::debug!(
                    scheme,
                    target_host,
                    pattern = pattern.pattern(),
                    "Target matches non-proxy host"
                );
                true
            }
            None => false,
        }
    }

    fn upstream_for(&self, scheme: &str) -> Option<(String, u16)> {
        let host_key = format!("{scheme}.proxyHost");
        let port_key = format!("{scheme}.proxyPort");

        let host = self.lookup(&host_key)?;
        let raw_port = self.lookup(&port_key)?;

        match raw_port.parse::<u16>() {
            Ok(port) if port > 0 => Some((host, port)),
            _ => {
                tracing::info!(key = %port_key, value = %raw_port, "Invalid proxy port, upstream ignored");
                None
            }
        }
    }

    /// Trimmed, non-empty property value.
    fn lookup(&self, key: &str) -> Option<String> {
        self.properties
            .property(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl fmt::Debug for RoutePlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutePlanner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn planner(pairs: &[(&str, &str)]) -> RoutePlanner {
        let props: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RoutePlanner::new(Arc::new(props))
    }

    #[test]
    fn non_proxy_hosts_bypass_upstream() {
        let planner = planner(&[
            ("https.proxyHost", "gw.corp"),
            ("https.proxyPort", "3128"),
            ("https.nonProxyHosts", "*.internal|10.*"),
        ]);

        assert_eq!(planner.route("api.internal", "https"), RouteDecision::Direct);
        assert_eq!(planner.route("10.4.0.9", "https"), RouteDecision::Direct);
        assert_eq!(
            planner.route("api.example.com", "https"),
            RouteDecision::Upstream {
                host: "gw.corp".into(),
                port: 3128
            }
        );
    }

    #[test]
    fn non_numeric_port_fails_open() {
        let planner = planner(&[("http.proxyHost", "gw.corp"), ("http.proxyPort", "abc")]);
        assert_eq!(planner.route("api.example.com", "http"), RouteDecision::Direct);
    }

    #[test]
    fn zero_or_missing_settings_mean_direct() {
        assert!(planner(&[("http.proxyHost", "gw.corp"), ("http.proxyPort", "0")])
            .route("a.com", "http")
            .is_direct());
        assert!(planner(&[("http.proxyHost", "gw.corp")])
            .route("a.com", "http")
            .is_direct());
        assert!(planner(&[("http.proxyHost", "  "), ("http.proxyPort", "80")])
            .route("a.com", "http")
            .is_direct());
        assert!(planner(&[]).route("a.com", "http").is_direct());
    }

    #[test]
    fn settings_are_per_scheme() {
        let planner = planner(&[("http.proxyHost", "gw.corp"), ("http.proxyPort", "8080")]);
        assert!(!planner.route("a.com", "http").is_direct());
        assert!(planner.route("a.com", "https").is_direct());
    }

    #[test]
    fn local_classifier_uses_domains_and_prefixes() {
        let classifier = LocalClassifier::from_config(&RoutingConfig::default());
        assert!(classifier.is_local("localhost"));
        assert!(classifier.is_local("printer.local"));
        assert!(classifier.is_local("192.168.1.20"));
        assert!(classifier.is_local("127.0.0.1"));
        assert!(!classifier.is_local("example.com"));
        assert!(!classifier.is_local("8.8.8.8"));
    }
}
