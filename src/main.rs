use anyhow::{Context, Result};
use clap::Parser;
use iplocate::config::{Config, LogFormat};
use iplocate::server::Server;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// IP-to-location lookup service
#[derive(Debug, Parser)]
#[command(name = "iplocate", version, about)]
struct Cli {
    /// Read environment variables from this file instead of ./.env
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Load configuration and data, then exit without serving
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables from .env file
    match &cli.env_file {
        Some(path) => {
            dotenv::from_path(path)
                .with_context(|| format!("Failed to read env file {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(&config);

    tracing::info!(
        port = config.port,
        database_type = %config.database_type,
        database_file_path = %config.database_file_path,
        rate_limit_rps = config.rate_limit_rps,
        rate_limit_burst = config.rate_limit_burst,
        debug_rate_limit_rps = config.debug_rate_limit_rps,
        debug_rate_limit_burst = config.debug_rate_limit_burst,
        "Starting iplocate service"
    );

    let server = Server::new(&config).context("Failed to create server")?;

    if cli.check_config {
        tracing::info!(addr = %server.addr(), "Configuration OK");
        return Ok(());
    }

    server.run().await.context("Server error")?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_directive()));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
