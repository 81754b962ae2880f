//! CONNECT tunnels.
//!
//! # Responsibilities
//! - Reach the target directly or through a chained upstream CONNECT
//! - Announce the tunnel to the client before any payload moves
//! - Relay bytes in both directions until each side ends
//!
//! # Design Decisions
//! - Client→target runs on its own task, target→client on the caller's
//! - Each direction half-closes its destination when it ends; the sockets
//!   are fully released only after both directions are done
//! - An idle read is the benign end of that direction, not an error

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use crate::proxy::error::ProxyError;
use crate::proxy::request::{read_headers, read_line};
use crate::routing::RouteDecision;

/// Read size of each relay loop.
pub const BUFFER_SIZE: usize = 4096;

/// Direction of a relay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToTarget,
    TargetToClient,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::ClientToTarget => "client_to_target",
            Direction::TargetToClient => "target_to_client",
        }
    }
}

/// Bytes moved by a finished tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub client_to_target: u64,
    pub target_to_client: u64,
}

/// Buffered halves of an established target connection.
pub struct TargetStream {
    pub reader: BufReader<OwnedReadHalf>,
    pub writer: BufWriter<OwnedWriteHalf>,
}

impl TargetStream {
    fn new(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: BufWriter::new(write),
        }
    }
}

/// Fixed success reply for an established tunnel.
pub fn established_response(proxy_agent: &str) -> String {
    format!("HTTP/1.0 200 Connection established\r\nProxy-Agent: {proxy_agent}\r\n\r\n")
}

/// Reply for a target that could not be reached in time.
pub fn timeout_response(proxy_agent: &str) -> String {
    format!("HTTP/1.0 504 Gateway Timeout\r\nProxy-Agent: {proxy_agent}\r\n\r\n")
}

/// Reply for an upstream proxy that refused to chain the tunnel.
pub fn bad_gateway_response(proxy_agent: &str) -> String {
    format!("HTTP/1.0 502 Bad Gateway\r\nProxy-Agent: {proxy_agent}\r\n\r\n")
}

/// Open the target side of a tunnel.
///
/// The whole attempt, including DNS and any upstream handshake, is bounded
/// by `connect_timeout`.
pub async fn open_target(
    host: &str,
    port: u16,
    route: &RouteDecision,
    connect_timeout: Duration,
) -> Result<TargetStream, ProxyError> {
    let attempt = async {
        match route {
            RouteDecision::Direct => connect_tcp(host, port).await.map(TargetStream::new),
            RouteDecision::Upstream {
                host: proxy_host,
                port: proxy_port,
            } => {
                let stream = connect_tcp(proxy_host, *proxy_port).await?;
                chain_connect(TargetStream::new(stream), host, port, proxy_host, *proxy_port).await
            }
        }
    };

    match timeout(connect_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(ProxyError::ConnectTimeout {
            target: format!("{host}:{port}"),
            after: connect_timeout,
        }),
    }
}

async fn connect_tcp(host: &str, port: u16) -> Result<TcpStream, ProxyError> {
    let target = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|_| ProxyError::Resolve(host.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(ProxyError::Resolve(host.to_string()));
    }

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "Connect attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(ProxyError::Connect {
        target,
        source: last_err.unwrap_or_else(|| std::io::ErrorKind::NotConnected.into()),
    })
}

/// Ask an upstream proxy to open `host:port` for us.
async fn chain_connect(
    mut upstream: TargetStream,
    host: &str,
    port: u16,
    proxy_host: &str,
    proxy_port: u16,
) -> Result<TargetStream, ProxyError> {
    let authority = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    let request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
    upstream.writer.write_all(request.as_bytes()).await?;
    upstream.writer.flush().await?;

    let proxy = format!("{proxy_host}:{proxy_port}");
    let status_line = read_line(&mut upstream.reader)
        .await?
        .unwrap_or_default();
    let status_line = status_line.trim_end().to_string();
    read_headers(&mut upstream.reader).await?;

    let accepted = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .is_some_and(|code| (200..300).contains(&code));

    if !accepted {
        return Err(ProxyError::UpstreamRefused {
            proxy,
            status: status_line,
        });
    }

    tracing::debug!(%proxy, tunnel_target = %authority, "Upstream tunnel established");
    Ok(upstream)
}

/// Copy `src` into `dst` until end of stream, error or `idle` without data.
///
/// `dst` is flushed whenever `src` has nothing more buffered, and shut down
/// (write side only) when the loop ends.
pub async fn pump<R, W>(
    src: &mut BufReader<R>,
    dst: &mut BufWriter<W>,
    idle: Duration,
    direction: Direction,
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;

    let outcome = loop {
        let read = match timeout(idle, src.read(&mut buf)).await {
            Err(_) => {
                tracing::trace!(direction = direction.label(), "Relay idle, ending direction");
                break Ok(());
            }
            Ok(Ok(0)) => break Ok(()),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => break Err(e),
        };

        if let Err(e) = dst.write_all(&buf[..read]).await {
            break Err(e);
        }
        total += read as u64;

        if src.buffer().is_empty() {
            if let Err(e) = dst.flush().await {
                break Err(e);
            }
        }
    };

    if let Err(e) = dst.shutdown().await {
        tracing::trace!(direction = direction.label(), error = %e, "Half-close failed");
    }

    outcome.map(|()| total)
}

/// Run both relay loops to completion.
pub async fn relay<CR, CW, TR, TW>(
    mut client_reader: BufReader<CR>,
    mut client_writer: BufWriter<CW>,
    mut target_reader: BufReader<TR>,
    mut target_writer: BufWriter<TW>,
    idle: Duration,
) -> RelaySummary
where
    CR: AsyncRead + Unpin + Send + 'static,
    CW: AsyncWrite + Unpin,
    TR: AsyncRead + Unpin,
    TW: AsyncWrite + Unpin + Send + 'static,
{
    let upstream = tokio::spawn(async move {
        pump(
            &mut client_reader,
            &mut target_writer,
            idle,
            Direction::ClientToTarget,
        )
        .await
    });

    let target_to_client = settle(
        pump(
            &mut target_reader,
            &mut client_writer,
            idle,
            Direction::TargetToClient,
        )
        .await,
        Direction::TargetToClient,
    );

    let client_to_target = match upstream.await {
        Ok(result) => settle(result, Direction::ClientToTarget),
        Err(e) => {
            tracing::error!(error = %e, "Client relay task failed");
            0
        }
    };

    RelaySummary {
        client_to_target,
        target_to_client,
    }
}

fn settle(result: std::io::Result<u64>, direction: Direction) -> u64 {
    match result {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(direction = direction.label(), error = %e, "Relay direction ended with error");
            0
        }
    }
}
