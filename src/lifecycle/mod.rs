//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build proxy (deadline armed) → Schedule attach
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Deadline and delayed attach stop → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then logging/metrics, then the proxy
//! - The proxy is built before any signal source starts

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
