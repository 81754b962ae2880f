//! Proxy server setup.
//!
//! # Responsibilities
//! - Build the state shared by every connection handler
//! - Bind the listener from the current configuration
//! - Dispatch accepted connections to [`RequestHandler`]

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::{LiveProperties, PropertySource, SharedConfig};
use crate::net::{Listener, ListenerError};
use crate::proxy::error::ProxyError;
use crate::proxy::forward::Forwarder;
use crate::proxy::handler::RequestHandler;
use crate::routing::RoutePlanner;

/// State cloned into each connection handler.
#[derive(Clone)]
pub struct ProxyState {
    pub config: SharedConfig,
    pub planner: RoutePlanner,
    pub forwarder: Arc<Forwarder>,
}

/// The forward proxy.
pub struct ProxyServer {
    state: ProxyState,
}

impl ProxyServer {
    /// Create a server whose routing properties come from the live config
    /// and the process environment.
    pub fn new(config: SharedConfig) -> Result<Self, ProxyError> {
        let properties = Arc::new(LiveProperties::new(config.clone()));
        Self::with_properties(config, properties)
    }

    pub fn with_properties(
        config: SharedConfig,
        properties: Arc<dyn PropertySource>,
    ) -> Result<Self, ProxyError> {
        let timeouts = config.load().timeouts.clone();
        let forwarder = Arc::new(Forwarder::new(timeouts.connect(), timeouts.relay_idle())?);
        Ok(Self {
            state: ProxyState {
                planner: RoutePlanner::new(properties),
                config,
                forwarder,
            },
        })
    }

    /// Bind the listener described by the current configuration.
    pub async fn bind(&self) -> Result<Listener, ListenerError> {
        let config = self.state.config.load_full();
        Listener::bind(&config.listener).await
    }

    /// Serve `listener` until `shutdown` fires and every handler has ended.
    pub async fn run(self, listener: Listener, shutdown: broadcast::Receiver<()>) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, "Proxy server starting"),
            Err(e) => tracing::warn!(error = %e, "Listener has no local address"),
        }

        let state = self.state;
        listener
            .serve(shutdown, move |stream, peer_addr, id| {
                let handler = RequestHandler::from_tcp(
                    stream,
                    peer_addr,
                    id,
                    state.config.load_full(),
                    state.planner.clone(),
                    state.forwarder.clone(),
                );
                handler.run()
            })
            .await;

        tracing::info!("Proxy server stopped");
    }
}
