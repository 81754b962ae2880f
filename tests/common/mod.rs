//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use forward_proxy::config::{self, ProxyConfig};
use forward_proxy::{ProxyServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A proxy running on an ephemeral loopback port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl TestProxy {
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }
}

/// Start the proxy with `config` and a fixed routing property table.
pub async fn start_proxy(mut config: ProxyConfig, properties: &[(&str, &str)]) -> TestProxy {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    let properties: HashMap<String, String> = properties
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let server = ProxyServer::with_properties(config::shared(config), Arc::new(properties)).unwrap();
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
    TestProxy {
        addr,
        shutdown,
        handle,
    }
}

/// Start a TCP server that echoes every connection until the peer
/// half-closes, then half-closes its own side.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(echo(socket));
        }
    });
    addr
}

async fn echo(mut socket: TcpStream) {
    let mut buf = [0u8; 4096];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if socket.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = socket.shutdown().await;
}

/// Start an HTTP origin that answers every request with `body` and reports
/// each received head over the returned channel.
pub async fn start_http_origin(body: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let _ = tx.send(head);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (addr, rx)
}

/// How a mock upstream proxy answers CONNECT.
#[derive(Debug, Clone, Copy)]
pub enum UpstreamBehavior {
    /// Accept tunnels and echo their payload.
    Accept,
    /// Refuse tunnels with `403 Forbidden`.
    Refuse,
    /// Accept the TCP connection but never answer anything.
    Silent,
}

/// Start a mock upstream proxy. Plain requests are answered with
/// `via upstream`; every received head is reported over the channel.
pub async fn start_upstream_proxy(
    behavior: UpstreamBehavior,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let is_connect = head.starts_with("CONNECT ");
                let _ = tx.send(head);

                match (is_connect, behavior) {
                    (_, UpstreamBehavior::Silent) => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        drop(socket);
                    }
                    (true, UpstreamBehavior::Accept) => {
                        let _ = socket
                            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                            .await;
                        echo(socket).await;
                    }
                    (true, UpstreamBehavior::Refuse) => {
                        let _ = socket
                            .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
                            .await;
                        let _ = socket.shutdown().await;
                    }
                    (false, _) => {
                        let body = "via upstream";
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                }
            });
        }
    });
    (addr, rx)
}

/// Read bytes up to and including the blank line ending an HTTP head.
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Send CONNECT for `authority` and return the proxy's reply head.
pub async fn open_tunnel(proxy: SocketAddr, authority: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), read_head(&mut stream))
        .await
        .unwrap();
    (stream, reply)
}

/// A loopback address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
