//! Per-connection request handling.
//!
//! ```text
//! AwaitRequestLine → Parse → Classify → Dispatch → Terminate
//!                                         ├─ Connect → tunnel
//!                                         └─ Forward → forward
//! ```
//!
//! Every failure here ends this connection only.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::ProxyConfig;
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::proxy::error::{ParseError, ProxyError};
use crate::proxy::forward::{ForwardRequest, Forwarder};
use crate::proxy::request::{read_headers, read_line, ParsedRequest, RequestKind};
use crate::proxy::tunnel::{self, TargetStream};
use crate::routing::{LocalClassifier, RouteDecision, RoutePlanner};

/// Owns one client connection from first byte to close.
pub struct RequestHandler<R, W> {
    id: ConnectionId,
    peer_addr: SocketAddr,
    reader: BufReader<R>,
    writer: BufWriter<W>,
    config: Arc<ProxyConfig>,
    planner: RoutePlanner,
    forwarder: Arc<Forwarder>,
}

impl RequestHandler<OwnedReadHalf, OwnedWriteHalf> {
    pub fn from_tcp(
        stream: TcpStream,
        peer_addr: SocketAddr,
        id: ConnectionId,
        config: Arc<ProxyConfig>,
        planner: RoutePlanner,
        forwarder: Arc<Forwarder>,
    ) -> Self {
        let (read, write) = stream.into_split();
        Self::new(read, write, peer_addr, id, config, planner, forwarder)
    }
}

impl<R, W> RequestHandler<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        reader: R,
        writer: W,
        peer_addr: SocketAddr,
        id: ConnectionId,
        config: Arc<ProxyConfig>,
        planner: RoutePlanner,
        forwarder: Arc<Forwarder>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            config,
            planner,
            forwarder,
        }
    }

    /// Handle the connection; never returns an error to the caller.
    pub async fn run(self) {
        let id = self.id;
        let peer_addr = self.peer_addr;

        match self.handle().await {
            Ok(()) => tracing::debug!(connection_id = %id, "Connection finished"),
            Err(ProxyError::Parse(e)) => {
                metrics::record_parse_error();
                tracing::debug!(connection_id = %id, %peer_addr, error = %e, "Dropping malformed request");
            }
            Err(ProxyError::Io(e)) => {
                tracing::debug!(connection_id = %id, %peer_addr, error = %e, "Connection ended by I/O error");
            }
            Err(e) => {
                tracing::warn!(connection_id = %id, %peer_addr, error = %e, "Request failed");
            }
        }
    }

    async fn handle(mut self) -> Result<(), ProxyError> {
        let wait = self.config.timeouts.request_line();
        let line = match within(wait, read_line(&mut self.reader)).await? {
            Some(Some(line)) => line,
            Some(None) => {
                tracing::debug!(connection_id = %self.id, "Client closed before sending a request");
                return Ok(());
            }
            None => {
                tracing::debug!(connection_id = %self.id, "No request line before timeout");
                return Ok(());
            }
        };

        let request = ParsedRequest::parse(&line)?;
        let route = self.classify(&request);
        metrics::record_request(
            if request.is_connect() { "connect" } else { "forward" },
            route.label(),
        );
        tracing::info!(
            connection_id = %self.id,
            method = %request.method,
            request_target = %request.raw_target,
            route = %route,
            "Request received"
        );

        match request.kind {
            RequestKind::Connect { host, port } => self.tunnel(&host, port, route).await,
            RequestKind::Forward { url } => self.forward(&request.method, url, route).await,
        }
    }

    /// Local targets go direct; otherwise ask the route planner.
    fn classify(&self, request: &ParsedRequest) -> RouteDecision {
        let local = LocalClassifier::from_config(&self.config.routing);
        if local.is_local(request.host()) {
            return RouteDecision::Direct;
        }
        self.planner.route(request.host(), request.scheme())
    }

    async fn tunnel(mut self, host: &str, port: u16, route: RouteDecision) -> Result<(), ProxyError> {
        // Tunnels carry no proxy headers; drop whatever the client sent.
        let wait = self.config.timeouts.request_line();
        if within(wait, read_headers(&mut self.reader)).await?.is_none() {
            tracing::debug!(connection_id = %self.id, "Client stalled inside the CONNECT head");
            return Ok(());
        }

        let agent = self.config.server.proxy_agent.clone();
        let target = match tunnel::open_target(host, port, &route, self.config.timeouts.connect()).await {
            Ok(target) => target,
            Err(e) => {
                let reply = if e.is_unreachable() {
                    metrics::record_connect_failure("connect");
                    tunnel::timeout_response(&agent)
                } else {
                    tunnel::bad_gateway_response(&agent)
                };
                self.writer.write_all(reply.as_bytes()).await?;
                self.writer.flush().await?;
                return Err(e);
            }
        };

        self.writer
            .write_all(tunnel::established_response(&agent).as_bytes())
            .await?;
        self.writer.flush().await?;

        let TargetStream { reader, writer } = target;
        let summary = tunnel::relay(
            self.reader,
            self.writer,
            reader,
            writer,
            self.config.timeouts.relay_idle(),
        )
        .await;

        metrics::record_tunnel_bytes("client_to_target", summary.client_to_target);
        metrics::record_tunnel_bytes("target_to_client", summary.target_to_client);
        tracing::debug!(
            connection_id = %self.id,
            tunnel_host = host,
            tunnel_port = port,
            sent = summary.client_to_target,
            received = summary.target_to_client,
            "Tunnel closed"
        );
        Ok(())
    }

    async fn forward(mut self, method: &str, url: Url, route: RouteDecision) -> Result<(), ProxyError> {
        let wait = self.config.timeouts.request_line();
        let Some(head) = within(wait, read_headers(&mut self.reader)).await? else {
            tracing::debug!(connection_id = %self.id, "Client stalled inside the request head");
            return Ok(());
        };
        let agent = self.config.server.proxy_agent.clone();

        let read = within(wait, ForwardRequest::read(method, url, &head, &mut self.reader)).await;
        let request = match read {
            Ok(Some(request)) => request,
            Ok(None) => {
                tracing::debug!(connection_id = %self.id, "Client stalled inside the request body");
                return Ok(());
            }
            Err(e) => {
                let status = match &e {
                    ProxyError::UnsupportedBody => Some("501 Not Implemented"),
                    ProxyError::Parse(ParseError::InvalidContentLength(_)) => Some("400 Bad Request"),
                    _ => None,
                };
                if let Some(status) = status {
                    let reply = format!("HTTP/1.0 {status}\r\nProxy-Agent: {agent}\r\n\r\n");
                    self.writer.write_all(reply.as_bytes()).await?;
                    self.writer.flush().await?;
                }
                return Err(e);
            }
        };

        let copied = self
            .forwarder
            .forward(request, &route, &mut self.writer, &agent)
            .await;
        if copied.is_err() {
            metrics::record_connect_failure("forward");
        }
        let copied = copied?;

        tracing::debug!(connection_id = %self.id, bytes = copied, "Response relayed");
        Ok(())
    }
}

/// Run a client read under `wait`. `Ok(None)` means the client went quiet
/// and the connection closes without a reply.
async fn within<T, F>(wait: Duration, read: F) -> Result<Option<T>, ProxyError>
where
    F: Future<Output = Result<T, ProxyError>>,
{
    match timeout(wait, read).await {
        Ok(result) => result.map(Some),
        Err(_) => Ok(None),
    }
}
