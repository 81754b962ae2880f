//! Graceful shutdown while tunnels are live.

use std::time::Duration;

use forward_proxy::ProxyConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

const ESTABLISHED: &str = "HTTP/1.0 200 Connection established\r\nProxy-Agent: ProxyServer/1.0\r\n\r\n";

#[tokio::test]
async fn test_idle_server_stops_promptly() {
    let proxy = common::start_proxy(ProxyConfig::default(), &[]).await;
    proxy.shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(2), proxy.handle)
        .await
        .expect("server should stop without live connections")
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_joins_every_live_tunnel() {
    let echo = common::start_echo_server().await;
    let mut config = ProxyConfig::default();
    // tunnels must end because their clients leave, not by idling out
    config.timeouts.relay_idle_secs = 30;
    let proxy = common::start_proxy(config, &[]).await;
    let addr = proxy.addr;

    let mut tunnels = Vec::new();
    for _ in 0..3 {
        let (stream, reply) = common::open_tunnel(addr, &echo.to_string()).await;
        assert_eq!(reply, ESTABLISHED);
        tunnels.push(stream);
    }

    proxy.shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!proxy.handle.is_finished());

    // live tunnels keep relaying during the drain
    for tunnel in &mut tunnels {
        tunnel.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        tunnel.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    // a connection arriving now is never served
    if let Ok(mut late) = TcpStream::connect(addr).await {
        let request = format!("CONNECT {echo} HTTP/1.1\r\n\r\n");
        let _ = late.write_all(request.as_bytes()).await;
        let mut buf = [0u8; 1];
        let outcome = tokio::time::timeout(Duration::from_millis(300), late.read(&mut buf)).await;
        assert!(!matches!(outcome, Ok(Ok(n)) if n > 0));
    }

    drop(tunnels);
    tokio::time::timeout(Duration::from_secs(5), proxy.handle)
        .await
        .expect("server should stop once every tunnel ended")
        .unwrap();
}

#[tokio::test]
async fn test_stalled_request_head_does_not_block_shutdown() {
    let echo = common::start_echo_server().await;
    let mut config = ProxyConfig::default();
    config.timeouts.request_line_ms = 300;
    let proxy = common::start_proxy(config, &[]).await;

    // request line only; the blank line never arrives
    let mut stalled = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {echo} HTTP/1.1\r\n");
    stalled.write_all(request.as_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    proxy.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(3), proxy.handle)
        .await
        .expect("a stalled client must not hold shutdown open")
        .unwrap();

    let mut rest = Vec::new();
    let _ = stalled.read_to_end(&mut rest).await;
    assert!(rest.is_empty());
}
