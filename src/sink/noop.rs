//! Sink that discards every signal.

use crate::signal::types::Payload;
use crate::sink::{Sink, SinkError};

/// Fallback installed when the deadline passes without a real sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl Sink for NoOpSink {
    fn add_custom_event(&self, _event_type: &str, _payload: &Payload) -> Result<(), SinkError> {
        Ok(())
    }

    fn add_timing(&self, _event_type: &str, _duration_ms: f64, _metadata: &Payload) -> Result<(), SinkError> {
        Ok(())
    }

    fn increment_counter(&self, _counter_name: &str) -> Result<(), SinkError> {
        Ok(())
    }

    fn set_identity(&self, _user_id: &str) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
