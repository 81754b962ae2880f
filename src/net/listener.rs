//! Client-facing accept loop.
//!
//! # Responsibilities
//! - Bind the proxy port once at startup
//! - Hand out a connection slot per accepted client, bounded by
//!   `listener.max_connections`
//! - Spawn one handler task per connection and join them all on shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot, OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;
use crate::net::connection::{ConnectionId, HandlerRegistry};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind listener: {0}")]
    Bind(std::io::Error),
    #[error("failed to accept client: {0}")]
    Accept(std::io::Error),
    #[error("connection slots closed")]
    LimiterClosed,
}

/// The proxy's listening socket plus its connection slots.
///
/// Once every slot is taken, `accept` stops pulling clients off the
/// backlog until a handler finishes.
pub struct Listener {
    socket: TcpListener,
    slots: Arc<Semaphore>,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let socket = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let bound = socket.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %bound,
            max_connections = config.max_connections,
            "Proxy listener bound"
        );

        Ok(Self {
            socket,
            slots: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Wait for a free slot, then for the next client.
    ///
    /// The returned [`ConnectionPermit`] holds the slot until dropped.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::LimiterClosed)?;

        let (stream, peer_addr) = self.socket.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(
            %peer_addr,
            free_slots = self.slots.available_permits(),
            "Client accepted"
        );

        Ok((stream, peer_addr, ConnectionPermit { _slot: slot }))
    }

    /// Run the accept loop until `shutdown` fires, then join every handler.
    ///
    /// The loop never waits on a handler. Once shutdown is observed no
    /// further `accept` is issued; the socket itself is closed only after
    /// all in-flight handlers have returned.
    pub async fn serve<H, Fut>(self, mut shutdown: broadcast::Receiver<()>, handler: H)
    where
        H: Fn(TcpStream, SocketAddr, ConnectionId) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let registry = HandlerRegistry::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.accept() => match accepted {
                    Ok((stream, peer_addr, permit)) => {
                        let id = ConnectionId::new();
                        let guard = registry.deregister_guard(id);
                        let task = handler(stream, peer_addr, id);
                        let (start_tx, start_rx) = oneshot::channel::<()>();

                        metrics::record_connection_opened();
                        let handle = tokio::spawn(async move {
                            let _guard = guard;
                            let _permit = permit;
                            if start_rx.await.is_ok() {
                                task.await;
                            }
                            metrics::record_connection_closed();
                        });
                        registry.insert(id, handle);
                        let _ = start_tx.send(());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        }

        tracing::info!(live_handlers = registry.live_count(), "Draining handlers");
        registry.join_all().await;

        let Self { socket, .. } = self;
        drop(socket);
        tracing::info!("Listening socket closed");
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Slots not currently held by a connection.
    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }
}

/// One occupied connection slot, released on drop even if the handler
/// panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}
