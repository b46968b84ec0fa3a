//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (buffered, forwarded, queue depth, attaches)
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `telemetry_proxy_signals_buffered_total` (counter): signals queued, by kind
//! - `telemetry_proxy_signals_forwarded_total` (counter): live forwards and drained signals, by kind
//! - `telemetry_proxy_queue_depth` (gauge): current queue length, by kind
//! - `telemetry_proxy_attach_total` (counter): transitions, by source (host/deadline)
//! - `telemetry_proxy_sink_errors_total` (counter): sink failures, by kind
//!
//! # Design Decisions
//! - Updates go through the `metrics` facade; with no recorder installed they are free
//! - Labels are bounded: kind and source only, never event types or user ids

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::signal::types::{AttachSource, QueueDepths, SignalKind};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a tokio runtime. Failure is logged, not fatal:
/// telemetry about telemetry is never worth aborting the host.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_buffered(kind: SignalKind, depth: usize) {
    metrics::counter!("telemetry_proxy_signals_buffered_total", "kind" => kind.as_str()).increment(1);
    metrics::gauge!("telemetry_proxy_queue_depth", "kind" => kind.as_str()).set(depth as f64);
}

pub fn record_forwarded(kind: SignalKind, count: usize) {
    if count > 0 {
        metrics::counter!("telemetry_proxy_signals_forwarded_total", "kind" => kind.as_str())
            .increment(count as u64);
    }
}

pub fn record_queue_depths(depths: QueueDepths) {
    metrics::gauge!("telemetry_proxy_queue_depth", "kind" => SignalKind::Event.as_str()).set(depths.events as f64);
    metrics::gauge!("telemetry_proxy_queue_depth", "kind" => SignalKind::Timing.as_str()).set(depths.timings as f64);
    metrics::gauge!("telemetry_proxy_queue_depth", "kind" => SignalKind::Counter.as_str()).set(depths.counters as f64);
}

pub fn record_attach(source: AttachSource) {
    metrics::counter!("telemetry_proxy_attach_total", "source" => source.as_str()).increment(1);
}

pub fn record_sink_error(kind: &'static str) {
    metrics::counter!("telemetry_proxy_sink_errors_total", "kind" => kind).increment(1);
}

/// Capture everything `f` records through the `metrics` facade on this thread.
#[cfg(test)]
pub(crate) fn capture<T>(f: impl FnOnce() -> T) -> (T, Captured) {
    use metrics_util::debugging::DebuggingRecorder;

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let out = metrics::with_local_recorder(&recorder, f);
    (out, Captured(snapshotter.snapshot().into_vec()))
}

#[cfg(test)]
pub(crate) struct Captured(
    Vec<(
        metrics_util::CompositeKey,
        Option<metrics::Unit>,
        Option<metrics::SharedString>,
        metrics_util::debugging::DebugValue,
    )>,
);

#[cfg(test)]
impl Captured {
    fn find(&self, name: &str, labels: &[(&str, &str)]) -> Option<&metrics_util::debugging::DebugValue> {
        self.0.iter().find_map(|(key, _, _, value)| {
            let key = key.key();
            let found: Vec<(&str, &str)> = key.labels().map(|l| (l.key(), l.value())).collect();
            (key.name() == name && found == labels).then_some(value)
        })
    }

    pub(crate) fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        match self.find(name, labels)? {
            metrics_util::debugging::DebugValue::Counter(value) => Some(*value),
            _ => None,
        }
    }

    pub(crate) fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        match self.find(name, labels)? {
            metrics_util::debugging::DebugValue::Gauge(value) => Some(value.into_inner()),
            _ => None,
        }
    }

    pub(crate) fn histogram(&self, name: &str, labels: &[(&str, &str)]) -> Option<Vec<f64>> {
        match self.find(name, labels)? {
            metrics_util::debugging::DebugValue::Histogram(values) => {
                Some(values.iter().map(|v| v.into_inner()).collect())
            }
            _ => None,
        }
    }
}
