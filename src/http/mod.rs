//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, catch-all handler)
//!     → request.rs (request ID stamped and propagated)
//!     → [balancer picks a backend]
//!     → proxy.rs (rewrite target, stream upstream, relay response)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod server;

pub use proxy::{ProxyError, ReverseProxy};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
