//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single origin server
//! - Expose liveness to the balancer
//! - Forward requests through a reverse proxy bound to the origin
//!
//! # Design Decisions
//! - `Backend` is object safe so the balancer holds `Arc<dyn Backend>`
//! - Liveness lives in an atomic; nothing in this crate probes origins, an
//!   external collaborator flips it through [`LivenessControl`]

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

use crate::config::validation::parse_backend_address;
use crate::http::proxy::ReverseProxy;
use crate::observability::metrics;

/// Capability set every backend variant provides to the balancer.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// The configured origin.
    fn address(&self) -> &Url;

    /// Whether the backend may receive traffic.
    fn is_alive(&self) -> bool;

    /// Forward a request and return the response to relay.
    ///
    /// Upstream failures are already folded into the response.
    async fn forward(&self, request: Request<Body>) -> Response;

    /// Liveness write handle, if this variant accepts external updates.
    fn liveness(&self) -> Option<&dyn LivenessControl> {
        None
    }
}

/// Write side of liveness, for health-check collaborators.
pub trait LivenessControl: Send + Sync {
    /// Set the liveness flag. Returns the previous value.
    fn set_alive(&self, alive: bool) -> bool;
}

/// Error returned when a backend address cannot be used.
#[derive(Debug, thiserror::Error)]
#[error("invalid backend address {address:?}: {reason}")]
pub struct InvalidAddress {
    pub address: String,
    pub reason: String,
}

/// An origin reached over plain HTTP(S).
#[derive(Debug)]
pub struct HttpBackend {
    proxy: ReverseProxy,
    alive: AtomicBool,
}

impl HttpBackend {
    /// Create a backend from a raw address. New backends start alive.
    pub fn new(address: &str, client: reqwest::Client) -> Result<Self, InvalidAddress> {
        let url = parse_backend_address(address).map_err(|reason| InvalidAddress {
            address: address.to_string(),
            reason,
        })?;
        Ok(Self {
            proxy: ReverseProxy::new(url, client),
            alive: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn address(&self) -> &Url {
        self.proxy.target()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    async fn forward(&self, request: Request<Body>) -> Response {
        self.proxy.forward(request).await
    }

    fn liveness(&self) -> Option<&dyn LivenessControl> {
        Some(self)
    }
}

impl LivenessControl for HttpBackend {
    fn set_alive(&self, alive: bool) -> bool {
        let previous = self.alive.swap(alive, Ordering::AcqRel);
        if previous != alive {
            tracing::info!(backend = %self.address(), alive, "Backend liveness changed");
        }
        metrics::record_backend_alive(self.address().as_str(), alive);
        previous
    }
}
