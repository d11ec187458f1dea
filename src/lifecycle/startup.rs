//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the metrics exporter when enabled
//! - Build the upstream client and the balancer from configuration
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when the balancer is ready)

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::http::proxy::build_client;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{Balancer, BalancerError};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Balancer(#[from] BalancerError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Build the balancer described by `config`.
pub fn build_balancer(config: &ProxyConfig) -> Result<Arc<Balancer>, StartupError> {
    let client = build_client(&config.timeouts)?;
    let balancer = Balancer::from_config(config, client)?;

    for backend in balancer.backends() {
        tracing::info!(backend = %backend.address(), "Backend registered");
        metrics::record_backend_alive(backend.address().as_str(), backend.is_alive());
    }
    Ok(Arc::new(balancer))
}

/// Bring the proxy up and serve until `shutdown` fires.
pub async fn start(config: ProxyConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let balancer = build_balancer(&config)?;

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address: address.clone(), source })?;

    tracing::info!(
        address = %address,
        port = %balancer.listen_port(),
        "Serving requests"
    );

    HttpServer::new(config, balancer)
        .run(listener, shutdown.subscribe())
        .await
        .map_err(StartupError::Serve)
}
