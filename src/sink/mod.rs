//! Sink subsystem.
//!
//! # Data Flow
//! ```text
//! SignalProxy (attached)
//!     → Sink::add_custom_event / add_timing / increment_counter / set_identity
//!
//! Implementations:
//!     → noop.rs      (deadline fallback, discards everything)
//!     → log.rs       (tracing events, target "telemetry")
//!     → metrics.rs   (metrics facade counters/histograms)
//!     → recording.rs (in-memory, for host tests)
//! ```
//!
//! # Design Decisions
//! - Object safe: the proxy stores `Arc<dyn Sink>`
//! - Calls are synchronous; a sink that does I/O should hand off internally
//! - Errors are returned to the caller of the forwarding operation unchanged
//! - The proxy holds no lock while a sink runs, so a sink may call back into it

pub mod log;
pub mod metrics;
pub mod noop;
pub mod recording;

pub use log::LogSink;
pub use metrics::MetricsSink;
pub use noop::NoOpSink;
pub use recording::{RecordingSink, SinkCall};

use thiserror::Error;

use crate::signal::types::Payload;

/// Errors raised by a sink implementation.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink refused a signal.
    #[error("sink rejected {kind}: {reason}")]
    Rejected { kind: &'static str, reason: String },

    /// The backend behind the sink is not reachable.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// Anything else a backend wants to surface.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The capability set every telemetry backend implements.
pub trait Sink: Send + Sync {
    /// Record a discrete event with its (already augmented) payload.
    fn add_custom_event(&self, event_type: &str, payload: &Payload) -> Result<(), SinkError>;

    /// Record a timing measurement in milliseconds.
    fn add_timing(&self, event_type: &str, duration_ms: f64, metadata: &Payload) -> Result<(), SinkError>;

    /// Bump a monotonic counter by one.
    fn increment_counter(&self, counter_name: &str) -> Result<(), SinkError>;

    /// Tag subsequent signals with the given user.
    fn set_identity(&self, user_id: &str) -> Result<(), SinkError>;

    /// Short name used in logs and metrics labels.
    fn name(&self) -> &'static str {
        "sink"
    }
}
