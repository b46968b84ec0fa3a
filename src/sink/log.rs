//! Sink that writes every signal to the tracing subscriber.

use tracing::Level;

use crate::signal::types::Payload;
use crate::sink::{Sink, SinkError};

/// Emits signals as structured `tracing` events under the `telemetry` target.
#[derive(Debug, Clone)]
pub struct LogSink {
    level: Level,
}

impl LogSink {
    /// Create a log sink emitting at `INFO`.
    pub fn new() -> Self {
        Self { level: Level::INFO }
    }

    /// Create a log sink emitting at the given level.
    pub fn with_level(level: Level) -> Self {
        Self { level }
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

// `tracing` needs a constant level per callsite.
macro_rules! emit {
    ($level:expr, $($arg:tt)+) => {
        let level = $level;
        if level == Level::TRACE {
            tracing::trace!(target: "telemetry", $($arg)+)
        } else if level == Level::DEBUG {
            tracing::debug!(target: "telemetry", $($arg)+)
        } else if level == Level::WARN {
            tracing::warn!(target: "telemetry", $($arg)+)
        } else if level == Level::ERROR {
            tracing::error!(target: "telemetry", $($arg)+)
        } else {
            tracing::info!(target: "telemetry", $($arg)+)
        }
    };
}

impl Sink for LogSink {
    fn add_custom_event(&self, event_type: &str, payload: &Payload) -> Result<(), SinkError> {
        emit!(self.level, event_type, payload = ?payload, "custom event");
        Ok(())
    }

    fn add_timing(&self, event_type: &str, duration_ms: f64, metadata: &Payload) -> Result<(), SinkError> {
        emit!(self.level, event_type, duration_ms, metadata = ?metadata, "timing");
        Ok(())
    }

    fn increment_counter(&self, counter_name: &str) -> Result<(), SinkError> {
        emit!(self.level, counter_name, "counter increment");
        Ok(())
    }

    fn set_identity(&self, user_id: &str) -> Result<(), SinkError> {
        emit!(self.level, user_id, "identity set");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
