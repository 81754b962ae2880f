//! Forward HTTP/HTTPS proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ net::Listener ──▶ proxy::RequestHandler ──┬─▶ tunnel (CONNECT) ──▶ target
//!                 │                     │                 └─▶ forward (HTTP)  ──▶ target
//!                 │                     ▼                          │
//!                 │              routing::RoutePlanner             └──▶ upstream proxy
//!                 │                     │
//!                 │              config (ArcSwap, hot reload)
//!                 ▼
//!          lifecycle::Shutdown ◀── admin console "close" / Ctrl-C
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;

use forward_proxy::admin::run_console;
use forward_proxy::config::loader::load_config;
use forward_proxy::config::watcher::ConfigWatcher;
use forward_proxy::config::{self, ProxyConfig};
use forward_proxy::lifecycle::{signals, Shutdown};
use forward_proxy::observability::{logging, metrics};
use forward_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Forward HTTP/HTTPS proxy with upstream chaining", long_about = None)]
struct Cli {
    /// TOML configuration file; watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not read admin commands from stdin.
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut proxy_config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(port) = cli.port {
        proxy_config.listener.set_port(port);
    }

    logging::init(&proxy_config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "forward-proxy starting");
    tracing::info!(
        bind_address = %proxy_config.listener.bind_address,
        max_connections = proxy_config.listener.max_connections,
        proxy_agent = %proxy_config.server.proxy_agent,
        "Configuration loaded"
    );

    if proxy_config.observability.metrics_enabled {
        match proxy_config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %proxy_config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shared = config::shared(proxy_config);

    // Dropping the watcher stops reloads, so it lives until main returns.
    let _watcher = match &cli.config {
        Some(path) => match ConfigWatcher::new(path, shared.clone()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Config hot reload disabled");
                None
            }
        },
        None => None,
    };

    let shutdown = Shutdown::new();
    tokio::spawn(signals::ctrl_c(shutdown.clone()));
    if !cli.no_console {
        let console = shutdown.clone();
        tokio::spawn(async move {
            run_console(BufReader::new(tokio::io::stdin()), console).await;
        });
    }

    let mut stop = shutdown.subscribe();
    let server = ProxyServer::new(shared)?;
    match server.bind().await {
        Ok(listener) => server.run(listener, stop).await,
        Err(e) => {
            // The admin path stays up; close or Ctrl-C still ends the process.
            tracing::error!(error = %e, "Listener failed to start, waiting for shutdown");
            let _ = stop.recv().await;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
