//! Command-line entry point for the ModelOps gateway server.

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use modelops_core::{ConfigLoader, GatewayConfig, GatewayFactory};
use modelops_server::{shutdown_signal, ModelOpsServer, ServerConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about = "ModelOps Gateway - chat-driven management of model deployments")]
struct Cli {
    #[clap(
        long,
        short,
        help = "YAML configuration file. Without it, configuration is read from AZURE_* environment variables and .env"
    )]
    config: Option<String>,

    #[clap(long, help = "Override the configured bind address")]
    bind_addr: Option<String>,

    #[clap(long, short, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let config = load_config(cli.config.as_deref()).await?;
    let orchestrator = GatewayFactory::create_from_config(&config)
        .context("Failed to build the gateway")?;

    let mut server_config = ServerConfig::from_settings(&config.server)?;
    if let Some(addr) = cli.bind_addr.as_deref() {
        server_config = server_config.with_bind_addr_str(addr)?;
    }

    ModelOpsServer::with_config(orchestrator, server_config)
        .serve_with_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn load_config(path: Option<&str>) -> Result<GatewayConfig> {
    match path {
        Some(path) => {
            log::info!("Loading configuration from file: {}", path);
            ConfigLoader::from_file(path)
                .await
                .with_context(|| format!("Failed to load configuration from '{}'", path))
        }
        None => {
            log::info!("Loading configuration from environment");
            ConfigLoader::from_env().context("Failed to load configuration from environment")
        }
    }
}
