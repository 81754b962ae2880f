//! Key/value routing properties consulted at decision time.
//!
//! Keys follow the `{scheme}.proxyHost`, `{scheme}.proxyPort` and
//! `{scheme}.nonProxyHosts` convention. The live source looks in the
//! current config's `[properties]` table, then the legacy `[upstream]`
//! section, then the process environment.

use std::collections::HashMap;

use crate::config::SharedConfig;

/// Read-only view over routing properties.
pub trait PropertySource: Send + Sync {
    fn property(&self, key: &str) -> Option<String>;
}

impl PropertySource for HashMap<String, String> {
    fn property(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Process environment lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProperties;

impl PropertySource for EnvProperties {
    fn property(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Properties backed by the hot-reloadable configuration.
#[derive(Debug, Clone)]
pub struct LiveProperties {
    config: SharedConfig,
    env_fallback: bool,
}

impl LiveProperties {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            env_fallback: true,
        }
    }

    /// Ignore the process environment; used by tests that must not be
    /// influenced by the host's proxy variables.
    pub fn without_env(mut self) -> Self {
        self.env_fallback = false;
        self
    }
}

impl PropertySource for LiveProperties {
    fn property(&self, key: &str) -> Option<String> {
        let config = self.config.load();
        if let Some(value) = config.properties.get(key) {
            return Some(value.clone());
        }

        let upstream = &config.upstream;
        let legacy = match key.split_once('.') {
            Some(("http" | "https", "proxyHost")) => upstream.host.clone(),
            Some(("http" | "https", "proxyPort")) => upstream.port.map(|p| p.to_string()),
            _ => None,
        };
        if legacy.is_some() {
            return legacy;
        }

        if self.env_fallback {
            EnvProperties.property(key)
        } else {
            None
        }
    }
}
