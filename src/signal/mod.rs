//! Signal buffering subsystem.
//!
//! # Data Flow
//! ```text
//! Caller: record_event / record_timing / increment_counter
//!     → version.rs (merge package-version field)
//!     → proxy.rs
//!         Buffering: append to per-kind FIFO queue
//!         Attached:  forward to Sink
//!
//! Host: attach(sink)                 deadline.rs: timer expires
//!     → drain queues FIFO                → attach(NoOpSink) if still buffering
//!     → forward identity
//!     → publish sink, cancel deadline
//! ```
//!
//! # Design Decisions
//! - One explicitly constructed proxy per process, shared as `Arc`
//! - The transition is one-way; a second attach is a no-op
//! - Sink errors are never swallowed on the live path

pub mod deadline;
pub mod proxy;
pub mod types;
pub mod version;

pub use deadline::FALLBACK_TIMEOUT;
pub use proxy::{SignalProxy, SignalProxyBuilder};
pub use types::{
    AttachOutcome, AttachSource, DrainReport, EventRecord, Payload, ProxyError, ProxyState,
    QueueDepths, SignalKind, TimingRecord,
};
pub use version::{PackageVersion, VERSION_KEY};
