//! eventd - DCR event node daemon
//!
//! Hosts event nodes of distributed DCR workflows and serves the node
//! protocol other event nodes call.

use clap::Parser;
use dcr_daemon::error::{DaemonError, DaemonResult};
use dcr_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Event node daemon CLI
#[derive(Parser)]
#[command(name = "eventd")]
#[command(about = "DCR event node daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DCR_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "DCR_LISTEN_ADDR")]
    listen: Option<String>,

    /// Address other nodes reach this one at
    #[arg(long, env = "DCR_PUBLIC_URI")]
    public_uri: Option<String>,

    /// Log level
    #[arg(long, env = "DCR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "DCR_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(public_uri) = cli.public_uri {
        config.server.public_uri = public_uri;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
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

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        public_uri = %config.server.public_uri,
        "Starting eventd"
    );

    let server = Server::new(config).await?;
    server.run().await
}
