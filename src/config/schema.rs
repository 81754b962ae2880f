//! TOML layout of the proxy configuration.
//!
//! Every section is optional; an empty file yields a proxy on
//! `0.0.0.0:8080` that always connects directly.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    pub timeouts: TimeoutConfig,

    /// Local/remote classification patterns.
    pub routing: RoutingConfig,

    /// Legacy single upstream proxy.
    pub upstream: UpstreamConfig,

    /// Free-form routing properties, e.g. `"https.proxyHost" = "gw.corp"`.
    pub properties: HashMap<String, String>,

    /// Log level and metrics endpoint.
    pub observability: ObservabilityConfig,

    /// Identity advertised to clients.
    pub server: ServerConfig,
}

/// Where clients connect.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Read once at startup; reloads do not rebind.
    pub bind_address: String,

    /// Clients served at once; further clients wait in the backlog.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

impl ListenerConfig {
    /// Replace the port of `bind_address`, keeping its host.
    pub fn set_port(&mut self, port: u16) {
        let host = match self.bind_address.rsplit_once(':') {
            Some((host, _)) if !host.is_empty() => host,
            _ => "0.0.0.0",
        };
        self.bind_address = format!("{host}:{port}");
    }
}

/// Timeout configuration for the per-connection state machine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a fresh connection may stay silent before its request line arrives.
    pub request_line_ms: u64,

    /// Connection establishment timeout towards the target, in seconds.
    pub connect_secs: u64,

    /// Idle window for each tunnel direction, in seconds.
    pub relay_idle_secs: u64,
}

impl TimeoutConfig {
    pub fn request_line(&self) -> Duration {
        Duration::from_millis(self.request_line_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn relay_idle(&self) -> Duration {
        Duration::from_secs(self.relay_idle_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_line_ms: 2_000,
            connect_secs: 5,
            relay_idle_secs: 5,
        }
    }
}

/// Patterns that classify a target as local, bypassing upstream lookup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Domain globs such as `*.local`.
    pub local_domains: Vec<String>,

    /// IP prefix globs such as `10.*`.
    pub local_ip_prefixes: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            local_domains: vec![
                "localhost".to_string(),
                "*.local".to_string(),
                "*.localdomain".to_string(),
            ],
            local_ip_prefixes: vec![
                "127.*".to_string(),
                "10.*".to_string(),
                "172.*".to_string(),
                "192.168.*".to_string(),
            ],
        }
    }
}

/// Fallback upstream proxy used for both `http` and `https` when the
/// scheme-specific properties are not set.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Level for this crate when `RUST_LOG` is unset.
    pub log_level: String,

    /// Serve Prometheus metrics on `metrics_address`.
    pub metrics_enabled: bool,
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Value of the `Proxy-Agent` header on proxy-generated status lines.
    pub proxy_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            proxy_agent: "ProxyServer/1.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.timeouts.request_line(), Duration::from_secs(2));
        assert_eq!(config.server.proxy_agent, "ProxyServer/1.0");
        assert!(config.properties.is_empty());
    }

    #[test]
    fn dotted_property_keys_parse() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [properties]
            "https.proxyHost" = "gw.corp"
            "https.proxyPort" = "3128"

            [upstream]
            host = "legacy.corp"
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.properties["https.proxyHost"], "gw.corp");
        assert_eq!(config.upstream.port, Some(8080));
    }

    #[test]
    fn port_override_keeps_host() {
        let mut listener = ListenerConfig::default();
        listener.set_port(3128);
        assert_eq!(listener.bind_address, "0.0.0.0:3128");

        listener.bind_address = "[::1]:8080".to_string();
        listener.set_port(9000);
        assert_eq!(listener.bind_address, "[::1]:9000");
    }
}
