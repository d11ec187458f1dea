//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML), optional
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once at startup to build the balancer
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend set never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BackendConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig,
    TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
