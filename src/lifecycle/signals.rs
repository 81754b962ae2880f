//! OS signal handling.
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Ctrl-C is treated exactly like the admin `close` command

use crate::lifecycle::Shutdown;

/// Wait for Ctrl-C and trigger `shutdown`.
///
/// If the handler cannot be installed the error is logged and shutdown is
/// left to the other triggers.
pub async fn ctrl_c(shutdown: Shutdown) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Ctrl-C received, shutting down");
            shutdown.trigger();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    }
}
