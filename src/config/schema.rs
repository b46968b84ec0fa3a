//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the telemetry proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::signal::version::VERSION_KEY;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Buffering proxy settings.
    pub proxy: ProxySettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Demo host settings (which sink to attach and when).
    pub host: HostConfig,
}

/// Buffering proxy settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Seconds to wait for a real sink before falling back to the no-op sink.
    pub fallback_timeout_secs: u64,

    /// Key the package version is stored under in payloads and metadata.
    pub version_key: String,

    /// Package version to embed. Defaults to this crate's version.
    pub package_version: Option<String>,

    /// Forward identity changes made after attach to the sink.
    pub forward_identity_after_attach: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            fallback_timeout_secs: 300, // 5 minutes
            version_key: VERSION_KEY.to_string(),
            package_version: None,
            forward_identity_after_attach: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Sink the demo host attaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Write signals to the log.
    #[default]
    Log,
    /// Map signals onto Prometheus metrics.
    Metrics,
    /// Never attach; let the deadline fall back.
    None,
}

/// Demo host configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HostConfig {
    /// Sink to attach.
    pub sink: SinkKind,

    /// Seconds after startup to attach the sink. Absent means never.
    pub attach_after_secs: Option<u64>,
}
