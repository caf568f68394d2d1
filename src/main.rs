//! meshcaline gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌────────────────────────────────────────────────────┐
//!                     │                     GATEWAY                        │
//!   Client Request    │  ┌─────────┐   ┌──────────┐   ┌─────────────────┐  │
//!   ──────────────────┼─▶│  http   │──▶│ routing  │──▶│ primary fetch   │──┼──▶ Backend
//!                     │  │ server  │   │  table   │   │ (upstream)      │  │
//!                     │  └─────────┘   └──────────┘   └───────┬─────────┘  │
//!                     │                                       │            │
//!                     │                          query? ──────┤            │
//!                     │                                       ▼            │
//!                     │  ┌───────────┐   ┌────────────┐   ┌──────────┐     │
//!   Client Response   │  │ multipart │◀──│ follow-ups │◀──│  query   │     │
//!   ◀─────────────────┼──│  encoder  │   │ (ordered)  │   │ projector│     │
//!                     │  └───────────┘   └────────────┘   └──────────┘     │
//!                     │                                                    │
//!                     │  config (TOML + watcher) · admin API · logging ·   │
//!                     │  metrics · lifecycle                               │
//!                     └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use meshcaline_proxy::config::{load_config, ConfigWatcher, ProxyConfig};
use meshcaline_proxy::http::HttpServer;
use meshcaline_proxy::lifecycle::{shutdown_signal, Shutdown};
use meshcaline_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "meshcaline-proxy", version, about = "Query-projecting reverse proxy")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "meshcaline-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        mappings = config.mappings.len(),
        upstream_timeout_secs = config.upstream.timeout_secs,
        follow_up_concurrency = config.query.follow_up_concurrency,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the life of the process.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    shutdown_signal().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
