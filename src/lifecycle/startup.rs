//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the proxy from validated configuration (arms the deadline)
//! - Pick the sink the host will attach
//! - Attach it after a delay, standing in for consent or network setup
//!
//! # Design Decisions
//! - Fail fast: a proxy that cannot arm its deadline is a startup error
//! - The proxy exists before any sink, so early signals are never lost

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::{SinkKind, TelemetryConfig};
use crate::lifecycle::Shutdown;
use crate::signal::{AttachOutcome, ProxyError, SignalProxy, SignalProxyBuilder};
use crate::sink::{LogSink, MetricsSink, Sink};

/// Build the proxy described by `config`, tied to the host's shutdown.
pub fn build_proxy(config: &TelemetryConfig, shutdown: &Shutdown) -> Result<Arc<SignalProxy>, ProxyError> {
    let proxy = shutdown.bind(SignalProxyBuilder::from_config(&config.proxy)).build()?;

    tracing::info!(
        version_key = proxy.package_version().key(),
        version = proxy.package_version().version(),
        fallback_timeout_secs = config.proxy.fallback_timeout_secs,
        "Signal proxy ready, buffering"
    );
    Ok(proxy)
}

/// Construct the configured sink. `SinkKind::None` yields no sink.
pub fn make_sink(kind: SinkKind) -> Option<Arc<dyn Sink>> {
    match kind {
        SinkKind::Log => Some(Arc::new(LogSink::new())),
        SinkKind::Metrics => Some(Arc::new(MetricsSink::new())),
        SinkKind::None => None,
    }
}

/// Attach `sink` once `delay` has passed, unless shutdown comes first.
///
/// Returns the attach outcome, or `None` when shutdown won or the drain failed
/// (the failure is logged; the proxy is attached either way).
pub async fn attach_after(
    proxy: Arc<SignalProxy>,
    sink: Arc<dyn Sink>,
    delay: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Option<AttachOutcome> {
    tokio::select! {
        _ = time::sleep(delay) => {}
        _ = shutdown.recv() => {
            tracing::debug!("Shutdown before delayed attach, sink not installed");
            return None;
        }
    }

    match proxy.attach(sink) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!(error = %e, "Sink attached with drain failures");
            None
        }
    }
}
