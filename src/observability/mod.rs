//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! SignalProxy produces:
//!     → logging.rs (attach, deadline expiry, drain failures)
//!     → metrics.rs (buffered/forwarded counters, queue depth gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments) and never touch the signal payloads

pub mod logging;
pub mod metrics;
