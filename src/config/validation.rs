//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Reject empty classification patterns
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),
    #[error("listener.max_connections must be greater than zero")]
    MaxConnections,
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("upstream.host is set but upstream.port is missing or zero")]
    UpstreamPort,
    #[error("routing.{0} contains an empty pattern")]
    EmptyPattern(&'static str),
    #[error("server.proxy_agent must not be empty")]
    ProxyAgent,
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::MaxConnections);
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("request_line_ms", timeouts.request_line_ms),
        ("connect_secs", timeouts.connect_secs),
        ("relay_idle_secs", timeouts.relay_idle_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    let upstream_host = config
        .upstream
        .host
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if !upstream_host.is_empty() && config.upstream.port.unwrap_or(0) == 0 {
        errors.push(ValidationError::UpstreamPort);
    }

    if config.routing.local_domains.iter().any(|p| p.trim().is_empty()) {
        errors.push(ValidationError::EmptyPattern("local_domains"));
    }
    if config
        .routing
        .local_ip_prefixes
        .iter()
        .any(|p| p.trim().is_empty())
    {
        errors.push(ValidationError::EmptyPattern("local_ip_prefixes"));
    }

    if config.server.proxy_agent.trim().is_empty() {
        errors.push(ValidationError::ProxyAgent);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.timeouts.connect_secs = 0;
        config.upstream.host = Some("gw.corp".into());
        config.routing.local_domains.push("  ".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::BindAddress("not-an-address".into()),
                ValidationError::ZeroTimeout("connect_secs"),
                ValidationError::UpstreamPort,
                ValidationError::EmptyPattern("local_domains"),
            ]
        );
    }
}
