//! Sink that maps signals onto the `metrics` facade.
//!
//! # Mapping
//! - counter `name`       → counter `{prefix}_{name}`
//! - timing `event_type`  → histogram `{prefix}_timing_ms{event_type}`
//! - event `event_type`   → counter `{prefix}_events_total{event_type}`
//! - identity             → info log, never used as a label (unbounded cardinality)
//!
//! Event payloads are dropped; the metrics pipeline has no place for them.

use crate::signal::types::Payload;
use crate::sink::{Sink, SinkError};

/// Default metric name prefix.
pub const DEFAULT_PREFIX: &str = "app";

#[derive(Debug, Clone)]
pub struct MetricsSink {
    prefix: String,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Full metric name for a counter signal.
    pub fn counter_key(&self, counter_name: &str) -> String {
        format!("{}_{}", self.prefix, sanitize(counter_name))
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Prometheus names allow `[a-zA-Z0-9_:]` only.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect()
}

impl Sink for MetricsSink {
    fn add_custom_event(&self, event_type: &str, _payload: &Payload) -> Result<(), SinkError> {
        metrics::counter!(format!("{}_events_total", self.prefix), "event_type" => event_type.to_string())
            .increment(1);
        Ok(())
    }

    fn add_timing(&self, event_type: &str, duration_ms: f64, _metadata: &Payload) -> Result<(), SinkError> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(SinkError::Rejected {
                kind: "timing",
                reason: format!("duration {} ms is not a non-negative number", duration_ms),
            });
        }
        metrics::histogram!(format!("{}_timing_ms", self.prefix), "event_type" => event_type.to_string())
            .record(duration_ms);
        Ok(())
    }

    fn increment_counter(&self, counter_name: &str) -> Result<(), SinkError> {
        metrics::counter!(self.counter_key(counter_name)).increment(1);
        Ok(())
    }

    fn set_identity(&self, user_id: &str) -> Result<(), SinkError> {
        tracing::info!(user_id, "Metrics sink received identity");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}
