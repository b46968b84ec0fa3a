//! Signal records, proxy state and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sink::SinkError;

/// Caller-supplied event payload / timing metadata.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A queued custom event. The payload is already augmented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: String,
    pub payload: Payload,
}

/// A queued timing measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub event_type: String,
    pub duration_ms: f64,
    pub metadata: Payload,
}

/// Lifecycle of a proxy. Moves `Buffering → Attached` once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyState {
    Buffering,
    Attached,
}

/// The three signal kinds, used for metric labels and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Event,
    Timing,
    Counter,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Event => "event",
            SignalKind::Timing => "timing",
            SignalKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What triggered the transition to `Attached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachSource {
    /// The host installed a sink.
    Host,
    /// The deadline passed and the no-op fallback was installed.
    Deadline,
}

impl AttachSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachSource::Host => "host",
            AttachSource::Deadline => "deadline",
        }
    }
}

/// Current length of each queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepths {
    pub events: usize,
    pub timings: usize,
    pub counters: usize,
}

impl QueueDepths {
    pub fn total(&self) -> usize {
        self.events + self.timings + self.counters
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Counts of what an attach delivered to the new sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub events: usize,
    pub timings: usize,
    pub counters: usize,
    pub identity_forwarded: bool,
}

/// Result of a call to `attach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// This call performed the transition.
    Attached(DrainReport),
    /// A sink was already attached; nothing happened.
    AlreadyAttached,
}

/// Errors surfaced by the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The attached sink failed a live forward.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// One or more queued signals failed while draining. The proxy is attached regardless.
    #[error("{failed} queued signal(s) failed to drain, first error: {source}")]
    Drain {
        failed: usize,
        #[source]
        source: SinkError,
    },

    /// A deadline was requested but no tokio runtime is running.
    #[error("deadline requires a running tokio runtime")]
    NoRuntime,
}
