//! irc-bridge: relays channel activity between IRC networks.
//!
//! Reads `config.toml` from the working directory, connects to every
//! configured network and runs until Ctrl+C.
//!
//! Logging is controlled with `RUST_LOG` (default
//! `irc_bridge=info,bridge_sdk=info`); set `IRC_BRIDGE_LOG_JSON=1` for JSON
//! output.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use irc_bridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use irc_bridge::endpoint::Endpoint;
use irc_bridge::relay::{EndpointSet, Peer};

const QUIT_MESSAGE: &str = "Bridge shutting down";

/// How long shutdown waits for QUITs to reach the servers.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "irc-bridge",
    version,
    about = "Relays channel activity between IRC networks",
    long_about = "Relays channel activity between IRC networks. Configuration is read from config.toml in the working directory."
)]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    Cli::parse();

    let json_logs = std::env::var("IRC_BRIDGE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "irc_bridge=info,bridge_sdk=info".into());
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = BridgeConfig::load(Path::new(DEFAULT_CONFIG_PATH))
        .with_context(|| format!("Failed to load {DEFAULT_CONFIG_PATH}"))?;

    let mut endpoints = Vec::with_capacity(config.servers.len());
    let mut streams = Vec::with_capacity(config.servers.len());
    for server in &config.servers {
        tracing::info!(
            server = %server.server_addr(),
            id = %server.identifier,
            tls = server.secure,
            "Connecting"
        );
        let (endpoint, events) = Endpoint::connect(&config, server);
        endpoints.push(endpoint);
        streams.push(events);
    }

    let peers = Arc::new(EndpointSet::new(
        endpoints
            .iter()
            .map(|e| e.clone() as Arc<dyn Peer>)
            .collect(),
    ));

    let tasks: Vec<_> = endpoints
        .iter()
        .cloned()
        .zip(streams)
        .map(|(endpoint, events)| tokio::spawn(endpoint.run(events, peers.clone())))
        .collect();

    tracing::info!(networks = peers.len(), "Bridge running. Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    for endpoint in &endpoints {
        let quit = endpoint.handle().quit(Some(QUIT_MESSAGE));
        match tokio::time::timeout_at(deadline, quit).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(id = endpoint.identifier(), error = %e, "Failed to send QUIT")
            }
            Err(_) => tracing::warn!(id = endpoint.identifier(), "Timed out sending QUIT"),
        }
    }
    for task in tasks {
        if tokio::time::timeout_at(deadline, task).await.is_err() {
            tracing::warn!("Timed out waiting for connections to close");
            break;
        }
    }

    Ok(())
}
