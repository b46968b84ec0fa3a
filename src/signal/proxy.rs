//! The buffering/forwarding facade.
//!
//! # State Machine
//! ```text
//! Buffering ──attach(sink)──▶ Draining ──queues empty──▶ Attached
//!     │                                                     ▲
//!     └──deadline (no-op sink)──▶ Draining ─────────────────┘
//! ```
//!
//! While buffering, every signal is appended to its queue. The first attach
//! drains the three queues in FIFO order, forwards a known identity, and
//! publishes the sink. From then on signals go straight to the sink and the
//! queues stay empty. `Draining` is internal; [`SignalProxy::state`] reports
//! it as `Buffering`.
//!
//! # Concurrency
//! One mutex guards phase, queues and identity. It is never held while a sink
//! runs: the drain takes the queues out in batches, forwards them unlocked,
//! and repeats until a batch comes back empty. Signals recorded meanwhile land
//! in the next batch, behind everything their caller recorded earlier. The
//! sink is published through an `ArcSwapOption` under the same lock that sees
//! the empty batch; once set, the forwarding path never takes the mutex.

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tokio::sync::broadcast;

use crate::config::schema::ProxySettings;
use crate::observability::metrics as proxy_metrics;
use crate::signal::deadline::{self, DeadlineGuard, FALLBACK_TIMEOUT};
use crate::signal::types::{
    AttachOutcome, AttachSource, DrainReport, EventRecord, Payload, ProxyError, ProxyState,
    QueueDepths, SignalKind, TimingRecord,
};
use crate::signal::version::PackageVersion;
use crate::sink::{NoOpSink, Sink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Buffering,
    Draining,
    Attached,
}

struct Buffer {
    phase: Phase,
    events: VecDeque<EventRecord>,
    timings: VecDeque<TimingRecord>,
    counters: VecDeque<String>,
    identity: Option<String>,
}

impl Buffer {
    fn new() -> Self {
        Self {
            phase: Phase::Buffering,
            events: VecDeque::new(),
            timings: VecDeque::new(),
            counters: VecDeque::new(),
            identity: None,
        }
    }

    fn state(&self) -> ProxyState {
        match self.phase {
            Phase::Attached => ProxyState::Attached,
            Phase::Buffering | Phase::Draining => ProxyState::Buffering,
        }
    }

    fn depths(&self) -> QueueDepths {
        QueueDepths {
            events: self.events.len(),
            timings: self.timings.len(),
            counters: self.counters.len(),
        }
    }
}

/// Signals taken out of the buffer for one drain round.
struct Batch {
    events: VecDeque<EventRecord>,
    timings: VecDeque<TimingRecord>,
    counters: VecDeque<String>,
    identity: Option<String>,
}

impl Batch {
    /// Empty the queues. The identity is included unless `forwarded` already
    /// delivered the same value.
    fn take(buffer: &mut Buffer, forwarded: Option<&str>) -> Self {
        Self {
            events: mem::take(&mut buffer.events),
            timings: mem::take(&mut buffer.timings),
            counters: mem::take(&mut buffer.counters),
            identity: buffer
                .identity
                .clone()
                .filter(|user_id| forwarded != Some(user_id.as_str())),
        }
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty() && self.timings.is_empty() && self.counters.is_empty() && self.identity.is_none()
    }
}

/// `ArcSwapOption` needs a sized target.
struct AttachedSink {
    sink: Arc<dyn Sink>,
}

/// Buffers telemetry until a sink is attached, then forwards to it.
pub struct SignalProxy {
    version: PackageVersion,
    buffer: Mutex<Buffer>,
    attached: ArcSwapOption<AttachedSink>,
    deadline: DeadlineGuard,
    fallback_after: Option<Duration>,
    forward_identity_after_attach: bool,
}

impl SignalProxy {
    pub fn builder() -> SignalProxyBuilder {
        SignalProxyBuilder::new()
    }

    // --- Signals ---

    /// Record a custom event. The payload gains the package-version field.
    pub fn record_event(&self, event_type: impl Into<String>, payload: Payload) -> Result<(), ProxyError> {
        let record = EventRecord {
            event_type: event_type.into(),
            payload: self.version.augment(payload),
        };
        self.enqueue_or_forward(record, SignalKind::Event, |buffer| &mut buffer.events, forward_event)
    }

    /// Record a timing measurement. Metadata holds only the package-version field.
    pub fn record_timing(&self, event_type: impl Into<String>, duration_ms: f64) -> Result<(), ProxyError> {
        let record = TimingRecord {
            event_type: event_type.into(),
            duration_ms,
            metadata: self.version.metadata(),
        };
        self.enqueue_or_forward(record, SignalKind::Timing, |buffer| &mut buffer.timings, forward_timing)
    }

    /// Record the time elapsed since `started` as a timing.
    pub fn record_elapsed(&self, event_type: impl Into<String>, started: Instant) -> Result<(), ProxyError> {
        self.record_timing(event_type, started.elapsed().as_secs_f64() * 1000.0)
    }

    pub fn increment_counter(&self, counter_name: impl Into<String>) -> Result<(), ProxyError> {
        self.enqueue_or_forward(
            counter_name.into(),
            SignalKind::Counter,
            |buffer| &mut buffer.counters,
            forward_counter,
        )
    }

    /// Remember the current user.
    ///
    /// An identity set while buffering is delivered once, on attach. After
    /// attach the value is stored but only forwarded when the proxy was built
    /// with `forward_identity_after_attach`.
    pub fn set_identity(&self, user_id: impl Into<String>) -> Result<(), ProxyError> {
        let user_id = user_id.into();
        let mut buffer = self.lock();
        buffer.identity = Some(user_id.clone());
        let attached = buffer.phase == Phase::Attached;
        drop(buffer);

        if attached && self.forward_identity_after_attach {
            if let Some(attached) = self.attached.load_full() {
                attached.sink.set_identity(&user_id).map_err(|e| {
                    proxy_metrics::record_sink_error("identity");
                    ProxyError::from(e)
                })?;
            }
        }
        Ok(())
    }

    // --- Attach ---

    /// Install the sink, drain the queues into it and switch to forwarding.
    ///
    /// Only the first call has any effect; later calls return
    /// [`AttachOutcome::AlreadyAttached`]. A sink failure during the drain
    /// does not stop it: every queued signal is offered, the proxy ends up
    /// attached, and the first failure is returned as [`ProxyError::Drain`].
    ///
    /// The sink runs without the proxy's lock held, so other callers keep
    /// buffering while a slow sink drains, and a sink may call back into the
    /// proxy. A second `attach` during the drain returns `AlreadyAttached`.
    pub fn attach(&self, sink: Arc<dyn Sink>) -> Result<AttachOutcome, ProxyError> {
        self.attach_from(sink, AttachSource::Host)
    }

    /// Called by the deadline task.
    pub(crate) fn expire(&self) {
        if self.is_attached() {
            tracing::trace!("Deadline passed after attach, nothing to do");
            return;
        }

        match self.attach_from(Arc::new(NoOpSink), AttachSource::Deadline) {
            Ok(AttachOutcome::Attached(report)) => tracing::warn!(
                after_secs = self.fallback_after.map(|d| d.as_secs_f64()),
                discarded_events = report.events,
                discarded_timings = report.timings,
                discarded_counters = report.counters,
                "No sink attached before deadline, falling back to no-op sink"
            ),
            Ok(AttachOutcome::AlreadyAttached) => {}
            Err(e) => tracing::error!(error = %e, "No-op fallback failed to attach"),
        }
    }

    fn attach_from(&self, sink: Arc<dyn Sink>, source: AttachSource) -> Result<AttachOutcome, ProxyError> {
        let name = sink.name();
        {
            let mut buffer = self.lock();
            if buffer.phase != Phase::Buffering {
                tracing::debug!(sink = name, source = source.as_str(), "Sink already attached, ignoring");
                return Ok(AttachOutcome::AlreadyAttached);
            }
            buffer.phase = Phase::Draining;
        }

        let mut report = DrainReport::default();
        let mut failures = DrainFailures::default();
        let mut forwarded_identity: Option<String> = None;
        let mut rounds = 0usize;

        loop {
            let batch = {
                let mut buffer = self.lock();
                let batch = Batch::take(&mut buffer, forwarded_identity.as_deref());
                if batch.is_empty() {
                    self.attached.store(Some(Arc::new(AttachedSink { sink: Arc::clone(&sink) })));
                    buffer.phase = Phase::Attached;
                    break;
                }
                batch
            };
            rounds += 1;

            for event in &batch.events {
                failures.note(SignalKind::Event.as_str(), forward_event(sink.as_ref(), event));
            }
            for timing in &batch.timings {
                failures.note(SignalKind::Timing.as_str(), forward_timing(sink.as_ref(), timing));
            }
            for counter in &batch.counters {
                failures.note(SignalKind::Counter.as_str(), forward_counter(sink.as_ref(), counter));
            }
            report.events += batch.events.len();
            report.timings += batch.timings.len();
            report.counters += batch.counters.len();

            if let Some(user_id) = batch.identity {
                failures.note("identity", sink.set_identity(&user_id));
                report.identity_forwarded = true;
                forwarded_identity = Some(user_id);
            }
            tracing::trace!(round = rounds, "Drain round finished");
        }

        match source {
            AttachSource::Host => {
                self.deadline.cancel();
            }
            AttachSource::Deadline => self.deadline.disarm(),
        }

        proxy_metrics::record_attach(source);
        proxy_metrics::record_forwarded(SignalKind::Event, report.events);
        proxy_metrics::record_forwarded(SignalKind::Timing, report.timings);
        proxy_metrics::record_forwarded(SignalKind::Counter, report.counters);
        proxy_metrics::record_queue_depths(QueueDepths::default());

        tracing::info!(
            sink = name,
            source = source.as_str(),
            rounds,
            events = report.events,
            timings = report.timings,
            counters = report.counters,
            identity_forwarded = report.identity_forwarded,
            "Sink attached"
        );

        failures.into_result(report)
    }

    // --- Inspection ---

    pub fn state(&self) -> ProxyState {
        self.lock().state()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load().is_some()
    }

    /// Name of the attached sink, if any.
    pub fn attached_sink(&self) -> Option<&'static str> {
        self.attached.load_full().map(|attached| attached.sink.name())
    }

    pub fn queue_depths(&self) -> QueueDepths {
        self.lock().depths()
    }

    pub fn queued_events(&self) -> Vec<EventRecord> {
        self.lock().events.iter().cloned().collect()
    }

    pub fn queued_timings(&self) -> Vec<TimingRecord> {
        self.lock().timings.iter().cloned().collect()
    }

    pub fn queued_counters(&self) -> Vec<String> {
        self.lock().counters.iter().cloned().collect()
    }

    pub fn identity(&self) -> Option<String> {
        self.lock().identity.clone()
    }

    pub fn package_version(&self) -> &PackageVersion {
        &self.version
    }

    /// Configured fallback interval, `None` when built without a deadline.
    pub fn fallback_after(&self) -> Option<Duration> {
        self.fallback_after
    }

    /// True while the deadline task is still pending.
    pub fn deadline_armed(&self) -> bool {
        self.deadline.is_armed()
    }

    // --- Internals ---

    fn enqueue_or_forward<T>(
        &self,
        record: T,
        kind: SignalKind,
        queue: fn(&mut Buffer) -> &mut VecDeque<T>,
        forward: fn(&dyn Sink, &T) -> Result<(), SinkError>,
    ) -> Result<(), ProxyError> {
        if let Some(attached) = self.attached.load_full() {
            return deliver(attached.sink.as_ref(), kind, &record, forward);
        }

        let mut buffer = self.lock();
        // Attach may have completed between the lock-free check and the lock.
        if let Some(attached) = self.attached.load_full() {
            drop(buffer);
            return deliver(attached.sink.as_ref(), kind, &record, forward);
        }

        let queue = queue(&mut *buffer);
        queue.push_back(record);
        let depth = queue.len();
        drop(buffer);

        tracing::trace!(kind = kind.as_str(), depth, "Signal buffered");
        proxy_metrics::record_buffered(kind, depth);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SignalProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffer = self.lock();
        f.debug_struct("SignalProxy")
            .field("state", &buffer.phase)
            .field("depths", &buffer.depths())
            .field("identity", &buffer.identity)
            .field("sink", &self.attached_sink())
            .field("version", &self.version)
            .finish()
    }
}

fn forward_event(sink: &dyn Sink, record: &EventRecord) -> Result<(), SinkError> {
    sink.add_custom_event(&record.event_type, &record.payload)
}

fn forward_timing(sink: &dyn Sink, record: &TimingRecord) -> Result<(), SinkError> {
    sink.add_timing(&record.event_type, record.duration_ms, &record.metadata)
}

fn forward_counter(sink: &dyn Sink, counter_name: &String) -> Result<(), SinkError> {
    sink.increment_counter(counter_name)
}

fn deliver<T>(
    sink: &dyn Sink,
    kind: SignalKind,
    record: &T,
    forward: fn(&dyn Sink, &T) -> Result<(), SinkError>,
) -> Result<(), ProxyError> {
    match forward(sink, record) {
        Ok(()) => {
            proxy_metrics::record_forwarded(kind, 1);
            Ok(())
        }
        Err(e) => {
            proxy_metrics::record_sink_error(kind.as_str());
            Err(e.into())
        }
    }
}

#[derive(Default)]
struct DrainFailures {
    failed: usize,
    first: Option<SinkError>,
}

impl DrainFailures {
    fn note(&mut self, kind: &'static str, result: Result<(), SinkError>) {
        if let Err(e) = result {
            tracing::warn!(kind, error = %e, "Sink failed while draining queued signal");
            proxy_metrics::record_sink_error(kind);
            self.failed += 1;
            if self.first.is_none() {
                self.first = Some(e);
            }
        }
    }

    fn into_result(self, report: DrainReport) -> Result<AttachOutcome, ProxyError> {
        match self.first {
            Some(source) => Err(ProxyError::Drain {
                failed: self.failed,
                source,
            }),
            None => Ok(AttachOutcome::Attached(report)),
        }
    }
}

/// Builder for [`SignalProxy`].
pub struct SignalProxyBuilder {
    version: PackageVersion,
    fallback_after: Option<Duration>,
    forward_identity_after_attach: bool,
    shutdown: Option<broadcast::Receiver<()>>,
}

impl SignalProxyBuilder {
    pub fn new() -> Self {
        Self {
            version: PackageVersion::default(),
            fallback_after: Some(FALLBACK_TIMEOUT),
            forward_identity_after_attach: false,
            shutdown: None,
        }
    }

    /// Builder preloaded from the `[proxy]` config section.
    pub fn from_config(settings: &ProxySettings) -> Self {
        let version = match &settings.package_version {
            Some(version) => PackageVersion::with_key(settings.version_key.clone(), version.clone()),
            None => PackageVersion::with_key(settings.version_key.clone(), env!("CARGO_PKG_VERSION")),
        };
        Self::new()
            .version(version)
            .fallback_after(Duration::from_secs(settings.fallback_timeout_secs))
            .forward_identity_after_attach(settings.forward_identity_after_attach)
    }

    pub fn version(mut self, version: PackageVersion) -> Self {
        self.version = version;
        self
    }

    pub fn fallback_after(mut self, after: Duration) -> Self {
        self.fallback_after = Some(after);
        self
    }

    /// Build without a fallback timer. The proxy buffers until `attach`.
    pub fn without_deadline(mut self) -> Self {
        self.fallback_after = None;
        self
    }

    pub fn forward_identity_after_attach(mut self, forward: bool) -> Self {
        self.forward_identity_after_attach = forward;
        self
    }

    /// Stop the deadline task when the host shuts down.
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Build the proxy and arm the deadline.
    ///
    /// Fails with [`ProxyError::NoRuntime`] when a deadline is configured and
    /// no tokio runtime is running.
    pub fn build(self) -> Result<Arc<SignalProxy>, ProxyError> {
        let proxy = Arc::new(SignalProxy {
            version: self.version,
            buffer: Mutex::new(Buffer::new()),
            attached: ArcSwapOption::empty(),
            deadline: DeadlineGuard::default(),
            fallback_after: self.fallback_after,
            forward_identity_after_attach: self.forward_identity_after_attach,
        });

        if let Some(after) = self.fallback_after {
            let handle = deadline::arm(Arc::downgrade(&proxy), after, self.shutdown)?;
            proxy.deadline.set(handle);
        }

        Ok(proxy)
    }
}

impl Default for SignalProxyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
