//! Buffering telemetry proxy.
//!
//! Callers record events, timings and counters from process start. Until the
//! host attaches a real [`Sink`], signals are queued; on attach they drain in
//! order and later signals flow straight through. If nothing is attached
//! before the deadline, the proxy falls back to a no-op sink.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod replay;
pub mod signal;
pub mod sink;

pub use config::TelemetryConfig;
pub use lifecycle::Shutdown;
pub use signal::{AttachOutcome, Payload, ProxyError, ProxyState, SignalProxy, SignalProxyBuilder};
pub use sink::{NoOpSink, Sink, SinkError};
