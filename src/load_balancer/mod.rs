//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → round_robin.rs (Balancer::select_next over the ordered list)
//!         - start at cursor % N
//!         - skip dead backends, at most N probes
//!         - cursor moves one past the chosen backend
//!     → backend.rs (Backend::forward through its reverse proxy)
//!     → Response, or 503 when nothing is alive
//! ```
//!
//! # Design Decisions
//! - Backends are trait objects so new variants need no balancer change
//! - Dead backends stay in rotation and are skipped, never removed
//! - No retries or failover: one selection, one upstream attempt

pub mod backend;
pub mod round_robin;

use thiserror::Error;

pub use backend::{Backend, HttpBackend, InvalidAddress, LivenessControl};
pub use round_robin::Balancer;

/// Errors raised while building or consulting the balancer.
#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("a balancer needs at least one backend")]
    NoBackends,

    #[error("none of the {backends} backends is alive")]
    NoLiveBackend { backends: usize },

    #[error(transparent)]
    InvalidAddress(#[from] InvalidAddress),
}
