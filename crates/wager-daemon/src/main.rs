//! wagerd — background orchestration daemon for the wager exchange.
//!
//! Wires storage, the payment provider client, catalog sync, and the
//! matchmaking/reconciliation/settlement engine behind a small JSON API,
//! then runs every background loop alongside it.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod notify;
mod server;

use config::DaemonConfig;
use error::DaemonResult;
use server::Server;

#[derive(Parser)]
#[command(name = "wagerd")]
#[command(about = "Peer-to-peer wager exchange daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WAGER_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "WAGER_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "WAGER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "WAGER_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| error::DaemonError::Config(e.to_string()))?;

    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| error::DaemonError::Config(format!("invalid listen address: {e}")))?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        "starting wagerd"
    );

    let server = Server::new(config).await?;
    server.run().await
}
