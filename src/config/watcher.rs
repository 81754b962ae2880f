//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::load_config;
use crate::config::SharedConfig;

/// Monitors the configuration file and swaps reloaded settings into the
/// shared handle that handlers and the route planner read from.
pub struct ConfigWatcher {
    path: PathBuf,
    shared: SharedConfig,
}

impl ConfigWatcher {
    pub fn new(path: &Path, shared: SharedConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            shared,
        }
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let shared = self.shared;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    reload(&path, &shared);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn reload(path: &Path, shared: &SharedConfig) {
    let new_config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
            return;
        }
    };

    let previous = shared.load();
    if previous.listener.bind_address != new_config.listener.bind_address {
        tracing::warn!(
            current = %previous.listener.bind_address,
            requested = %new_config.listener.bind_address,
            "Bind address changes take effect after restart"
        );
    }

    tracing::info!(
        properties = new_config.properties.len(),
        local_domains = new_config.routing.local_domains.len(),
        "Configuration reloaded"
    );
    shared.store(Arc::new(new_config));
}
