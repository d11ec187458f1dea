//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Balancer, backends, HTTP layer produce:
//!     → logging.rs (structured log events, request ID on every span)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape), when enabled
//! ```

pub mod logging;
pub mod metrics;
