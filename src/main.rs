//! Round-robin reverse-proxy load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                 LOAD BALANCER                │
//!   Client Request     │  ┌─────────┐    ┌───────────────────────┐    │
//!   ───────────────────┼─▶│  http   │───▶│   Balancer            │    │
//!                      │  │ server  │    │   select_next()       │    │
//!                      │  └─────────┘    │   cursor % N, skip    │    │
//!                      │                 │   dead backends       │    │
//!                      │                 └──────────┬────────────┘    │
//!                      │                            ▼                 │
//!   Client Response    │  ┌─────────┐    ┌───────────────────────┐    │
//!   ◀──────────────────┼──│ stream  │◀───│ Backend::forward      │◀───┼── Origin
//!                      │  │ relay   │    │ (reverse proxy)       │    │
//!                      │  └─────────┘    └───────────────────────┘    │
//!                      │                                              │
//!                      │  config · observability · lifecycle · admin  │
//!                      └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use round_robin_proxy::config::{load_config, validate_config, BackendConfig, ConfigError};
use round_robin_proxy::lifecycle::{self, Shutdown};
use round_robin_proxy::observability::logging;
use round_robin_proxy::ProxyConfig;

#[derive(Parser, Debug)]
#[command(name = "round-robin-proxy")]
#[command(about = "Round-robin reverse-proxy load balancer", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port, overrides the config file.
    #[arg(short, long)]
    port: Option<String>,

    /// Backend origin; repeat to list several. Replaces configured backends.
    #[arg(short, long = "backend")]
    backends: Vec<String>,
}

fn resolve_config(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(port) = &cli.port {
        config.listener.port = port.clone();
    }
    if !cli.backends.is_empty() {
        config.backends = cli.backends.iter().map(BackendConfig::new).collect();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error {e}");
            std::process::exit(1);
        }
    };

    logging::init(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = %config.listener.port,
        backends = config.backends.len(),
        "round-robin-proxy starting"
    );

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    if let Err(e) = lifecycle::start(config, &shutdown).await {
        tracing::error!(error = %e, "Fatal startup error");
        eprintln!("Error {e}");
        std::process::exit(1);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
