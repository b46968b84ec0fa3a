//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → TelemetryConfig (validated, immutable)
//!     → proxy settings feed SignalProxyBuilder::from_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the proxy reads it once at build time
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{HostConfig, LogFormat, ObservabilityConfig, ProxySettings, SinkKind, TelemetryConfig};
pub use validation::{validate_config, ValidationError};
