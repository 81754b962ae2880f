//! Connection identity and the live-handler registry.
//!
//! # Responsibilities
//! - Number each accepted client for log correlation
//! - Hold the join handle of every in-flight handler
//! - Drain and join handlers one at a time on shutdown
//!
//! Handlers never see the registry itself, only a [`Deregister`] guard that
//! removes their entry when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::task::JoinHandle;

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique client connection number, shown as `conn-N` in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

type Handles = DashMap<ConnectionId, JoinHandle<()>>;

/// Registry of live connection handlers, owned by the listener.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handles: Arc<Handles>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a guard for a handler about to be spawned.
    pub fn deregister_guard(&self, id: ConnectionId) -> Deregister {
        Deregister {
            id,
            handles: Arc::downgrade(&self.handles),
        }
    }

    /// Record the join handle of a spawned handler.
    ///
    /// Callers must insert before the handler is allowed to run, otherwise
    /// its guard could fire first and leave a stale entry behind.
    pub fn insert(&self, id: ConnectionId, handle: JoinHandle<()>) {
        self.handles.insert(id, handle);
    }

    /// Number of handlers still registered.
    pub fn live_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every registered handler to finish, one at a time.
    ///
    /// A handler that panicked is logged and skipped; joining continues.
    pub async fn join_all(&self) {
        loop {
            let next = self.handles.iter().next().map(|entry| *entry.key());
            let Some(id) = next else { break };

            let Some((_, handle)) = self.handles.remove(&id) else {
                continue;
            };

            tracing::info!(connection_id = %id, "Waiting on handler to close");
            match handle.await {
                Ok(()) => tracing::debug!(connection_id = %id, "Handler closed"),
                Err(e) => tracing::error!(connection_id = %id, error = %e, "Handler did not finish cleanly"),
            }
        }
    }
}

/// Removes a handler's registry entry when dropped.
///
/// Dropping an orphaned guard (registry already gone) is a no-op.
#[derive(Debug)]
pub struct Deregister {
    id: ConnectionId,
    handles: Weak<Handles>,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        if let Some(handles) = self.handles.upgrade() {
            handles.remove(&self.id);
        }
        tracing::trace!(connection_id = %self.id, "Handler deregistered");
    }
}
