//! Buffering, draining and forwarding behaviour of the signal proxy.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use telemetry_proxy::signal::{DrainReport, ProxyState};
use telemetry_proxy::sink::{RecordingSink, SinkCall};
use telemetry_proxy::{AttachOutcome, Payload, ProxyError, SignalProxy, Sink, SinkError};

mod common;
use common::*;

// --- Before a sink is attached ---

#[test]
fn test_event_is_queued_with_version() {
    let proxy = buffering_proxy();
    proxy.record_event(EVENT_TYPE, event_payload()).unwrap();

    let events = proxy.queued_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EVENT_TYPE);
    assert_eq!(events[0].payload, augmented_event_payload());
}

#[test]
fn test_timing_is_queued_with_version_metadata() {
    let proxy = buffering_proxy();
    proxy.record_timing(TIMING_EVENT_TYPE, DURATION_MS).unwrap();

    let timings = proxy.queued_timings();
    assert_eq!(timings.len(), 1);
    assert_eq!(timings[0].event_type, TIMING_EVENT_TYPE);
    assert_eq!(timings[0].duration_ms, DURATION_MS);
    assert_eq!(timings[0].metadata, version_metadata());
}

#[test]
fn test_counter_is_queued() {
    let proxy = buffering_proxy();
    proxy.increment_counter(COUNTER_NAME).unwrap();

    assert_eq!(proxy.queued_counters(), vec![COUNTER_NAME]);
}

#[test]
fn test_identity_is_stored() {
    let proxy = buffering_proxy();
    assert!(proxy.identity().is_none());

    proxy.set_identity(USER).unwrap();
    assert_eq!(proxy.identity().as_deref(), Some(USER));

    proxy.set_identity("someone-else").unwrap();
    assert_eq!(proxy.identity().as_deref(), Some("someone-else"));
}

#[test]
fn test_each_call_grows_exactly_one_queue() {
    let proxy = buffering_proxy();

    proxy.record_event(EVENT_TYPE, Payload::new()).unwrap();
    let depths = proxy.queue_depths();
    assert_eq!((depths.events, depths.timings, depths.counters), (1, 0, 0));

    proxy.record_timing(TIMING_EVENT_TYPE, DURATION_MS).unwrap();
    let depths = proxy.queue_depths();
    assert_eq!((depths.events, depths.timings, depths.counters), (1, 1, 0));

    proxy.increment_counter(COUNTER_NAME).unwrap();
    proxy.increment_counter(COUNTER_NAME).unwrap();
    let depths = proxy.queue_depths();
    assert_eq!((depths.events, depths.timings, depths.counters), (1, 1, 2));
    assert_eq!(proxy.state(), ProxyState::Buffering);
}

#[test]
fn test_caller_version_field_is_overwritten() {
    let proxy = buffering_proxy();
    let payload = as_payload(serde_json::json!({"gitHubPackageVersion": "9.9.9", "a": 1}));
    proxy.record_event(EVENT_TYPE, payload).unwrap();

    let stored = &proxy.queued_events()[0].payload;
    assert_eq!(stored["gitHubPackageVersion"], VERSION);
    assert_eq!(stored["a"], 1);
}

// --- Attaching ---

#[test]
fn test_attach_empties_all_queues() {
    let proxy = buffering_proxy();
    proxy.record_event(EVENT_TYPE, event_payload()).unwrap();
    proxy.record_timing(TIMING_EVENT_TYPE, DURATION_MS).unwrap();
    proxy.increment_counter(COUNTER_NAME).unwrap();

    let sink = Arc::new(RecordingSink::new());
    let outcome = proxy.attach(sink.clone()).unwrap();

    assert_eq!(
        outcome,
        AttachOutcome::Attached(DrainReport {
            events: 1,
            timings: 1,
            counters: 1,
            identity_forwarded: false,
        })
    );
    assert_eq!(sink.events(), vec![(EVENT_TYPE.to_string(), augmented_event_payload())]);
    assert_eq!(
        sink.timings(),
        vec![(TIMING_EVENT_TYPE.to_string(), DURATION_MS, version_metadata())]
    );
    assert_eq!(sink.counters(), vec![COUNTER_NAME]);
    assert!(proxy.queue_depths().is_empty());
    assert_eq!(proxy.state(), ProxyState::Attached);
    assert_eq!(proxy.attached_sink(), Some("recording"));
}

#[test]
fn test_drain_preserves_per_queue_order() {
    let proxy = buffering_proxy();
    for i in 0..5 {
        proxy.record_event(format!("event-{i}"), Payload::new()).unwrap();
        proxy.increment_counter(format!("counter-{i}")).unwrap();
        proxy.record_timing(format!("timing-{i}"), i as f64).unwrap();
    }

    let sink = Arc::new(RecordingSink::new());
    proxy.attach(sink.clone()).unwrap();

    let event_types: Vec<_> = sink.events().into_iter().map(|(t, _)| t).collect();
    let timing_types: Vec<_> = sink.timings().into_iter().map(|(t, d, _)| (t, d)).collect();
    assert_eq!(event_types, (0..5).map(|i| format!("event-{i}")).collect::<Vec<_>>());
    assert_eq!(timing_types, (0..5).map(|i| (format!("timing-{i}"), i as f64)).collect::<Vec<_>>());
    assert_eq!(sink.counters(), (0..5).map(|i| format!("counter-{i}")).collect::<Vec<_>>());
}

#[test]
fn test_nothing_reaches_sink_before_attach() {
    let proxy = buffering_proxy();
    let sink = Arc::new(RecordingSink::new());

    proxy.record_event(EVENT_TYPE, event_payload()).unwrap();
    proxy.record_timing(TIMING_EVENT_TYPE, DURATION_MS).unwrap();
    proxy.increment_counter(COUNTER_NAME).unwrap();
    proxy.set_identity(USER).unwrap();
    assert!(sink.is_empty());

    proxy.attach(sink.clone()).unwrap();
    assert_eq!(sink.len(), 4);
}

#[test]
fn test_second_attach_is_noop() {
    let proxy = buffering_proxy();
    proxy.increment_counter(COUNTER_NAME).unwrap();
    proxy.set_identity(USER).unwrap();

    let first = Arc::new(RecordingSink::new());
    let second = Arc::new(RecordingSink::new());
    proxy.attach(first.clone()).unwrap();

    let outcome = proxy.attach(second.clone()).unwrap();
    assert_eq!(outcome, AttachOutcome::AlreadyAttached);
    assert!(second.is_empty());
    assert_eq!(first.counters(), vec![COUNTER_NAME]);
    assert_eq!(first.identities(), vec![USER]);

    // Live calls still go to the first sink.
    proxy.increment_counter("pull").unwrap();
    assert_eq!(first.counters(), vec![COUNTER_NAME, "pull"]);
    assert!(second.is_empty());
}

// --- After a sink is attached ---

#[test]
fn test_event_bypasses_queue() {
    let proxy = buffering_proxy();
    let sink = Arc::new(RecordingSink::new());
    proxy.attach(sink.clone()).unwrap();
    assert!(sink.events().is_empty());

    proxy.record_event(EVENT_TYPE, event_payload()).unwrap();
    assert_eq!(proxy.queue_depths().events, 0);
    assert_eq!(sink.events(), vec![(EVENT_TYPE.to_string(), augmented_event_payload())]);
}

#[test]
fn test_timing_bypasses_queue() {
    let proxy = buffering_proxy();
    let sink = Arc::new(RecordingSink::new());
    proxy.attach(sink.clone()).unwrap();

    proxy.record_timing(TIMING_EVENT_TYPE, DURATION_MS).unwrap();
    assert_eq!(proxy.queue_depths().timings, 0);
    assert_eq!(
        sink.timings(),
        vec![(TIMING_EVENT_TYPE.to_string(), DURATION_MS, version_metadata())]
    );
}

#[test]
fn test_counter_bypasses_queue() {
    let proxy = buffering_proxy();
    let sink = Arc::new(RecordingSink::new());
    proxy.attach(sink.clone()).unwrap();

    proxy.increment_counter(COUNTER_NAME).unwrap();
    assert_eq!(proxy.queue_depths().counters, 0);
    assert_eq!(sink.calls(), vec![SinkCall::Counter { name: COUNTER_NAME.into() }]);
}

#[test]
fn test_identity_forwarded_on_attach() {
    let proxy = buffering_proxy();
    proxy.set_identity(USER).unwrap();

    let sink = Arc::new(RecordingSink::new());
    let outcome = proxy.attach(sink.clone()).unwrap();

    assert!(matches!(outcome, AttachOutcome::Attached(report) if report.identity_forwarded));
    assert_eq!(sink.identities(), vec![USER]);
}

#[test]
fn test_no_identity_call_when_unset() {
    let proxy = buffering_proxy();
    let sink = Arc::new(RecordingSink::new());
    proxy.attach(sink.clone()).unwrap();

    assert!(sink.identities().is_empty());
}

#[test]
fn test_identity_after_attach_is_stored_not_forwarded() {
    let proxy = buffering_proxy();
    let sink = Arc::new(RecordingSink::new());
    proxy.attach(sink.clone()).unwrap();

    proxy.set_identity(USER).unwrap();
    assert_eq!(proxy.identity().as_deref(), Some(USER));
    assert!(sink.identities().is_empty());
}

#[test]
fn test_live_sink_failure_reaches_caller() {
    let proxy = buffering_proxy();
    let sink = Arc::new(RecordingSink::new());
    proxy.attach(sink.clone()).unwrap();

    sink.set_failing(true);
    let err = proxy.record_event(EVENT_TYPE, event_payload()).unwrap_err();
    assert!(matches!(err, ProxyError::Sink(_)));

    sink.set_failing(false);
    proxy.record_event(EVENT_TYPE, event_payload()).unwrap();
    assert_eq!(sink.events().len(), 2);
}

#[test]
fn test_concurrent_callers_lose_nothing() {
    let proxy = buffering_proxy();
    let sink = Arc::new(RecordingSink::new());

    let workers: Vec<_> = (0..4)
        .map(|w| {
            let proxy = proxy.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    proxy.increment_counter(format!("{w}-{i}")).unwrap();
                }
            })
        })
        .collect();

    proxy.attach(sink.clone()).unwrap();
    for worker in workers {
        worker.join().unwrap();
    }

    let counters = sink.counters();
    assert_eq!(counters.len(), 1000);
    assert!(proxy.queue_depths().is_empty());

    // Each thread's own counters arrive in the order it issued them.
    for w in 0..4 {
        let prefix = format!("{w}-");
        let seen: Vec<usize> = counters
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(seen, (0..250).collect::<Vec<_>>());
    }
}

// --- Slow and re-entrant sinks ---

/// Holds every event until the test releases it, counters pass straight through.
struct GatedSink {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
    inner: RecordingSink,
}

impl GatedSink {
    fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let sink = Arc::new(Self {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            inner: RecordingSink::new(),
        });
        (sink, entered_rx, release_tx)
    }
}

impl Sink for GatedSink {
    fn add_custom_event(&self, event_type: &str, payload: &Payload) -> Result<(), SinkError> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        self.inner.add_custom_event(event_type, payload)
    }

    fn add_timing(&self, event_type: &str, duration_ms: f64, metadata: &Payload) -> Result<(), SinkError> {
        self.inner.add_timing(event_type, duration_ms, metadata)
    }

    fn increment_counter(&self, counter_name: &str) -> Result<(), SinkError> {
        self.inner.increment_counter(counter_name)
    }

    fn set_identity(&self, user_id: &str) -> Result<(), SinkError> {
        self.inner.set_identity(user_id)
    }
}

#[test]
fn test_callers_keep_buffering_while_sink_drains() {
    let proxy = buffering_proxy();
    proxy.record_event(EVENT_TYPE, event_payload()).unwrap();
    proxy.increment_counter(COUNTER_NAME).unwrap();

    let (sink, entered, release) = GatedSink::new();
    let attaching = {
        let proxy = proxy.clone();
        let sink: Arc<dyn Sink> = sink.clone();
        thread::spawn(move || proxy.attach(sink))
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    // The sink is stuck inside the drain. Other callers must not wait for it.
    let (done_tx, done_rx) = mpsc::channel();
    {
        let proxy = proxy.clone();
        thread::spawn(move || {
            proxy.increment_counter("pull").unwrap();
            proxy.set_identity(USER).unwrap();
            let _ = done_tx.send(proxy.queue_depths());
        });
    }
    let depths = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(depths.counters, 1);
    assert_eq!(proxy.state(), ProxyState::Buffering);
    assert_eq!(
        proxy.attach(Arc::new(RecordingSink::new())).unwrap(),
        AttachOutcome::AlreadyAttached
    );

    release.send(()).unwrap();
    let outcome = attaching.join().unwrap().unwrap();

    assert!(matches!(outcome, AttachOutcome::Attached(report) if report.counters == 2 && report.identity_forwarded));
    assert_eq!(sink.inner.counters(), vec![COUNTER_NAME, "pull"]);
    assert_eq!(sink.inner.identities(), vec![USER]);
    assert_eq!(proxy.attached_sink(), Some("sink"));
    assert!(proxy.queue_depths().is_empty());
}

/// Calls back into the proxy from every event it receives.
struct EchoSink {
    proxy: OnceLock<Weak<SignalProxy>>,
    inner: RecordingSink,
}

impl Sink for EchoSink {
    fn add_custom_event(&self, event_type: &str, payload: &Payload) -> Result<(), SinkError> {
        if let Some(proxy) = self.proxy.get().and_then(Weak::upgrade) {
            let _ = proxy.queue_depths();
            proxy.increment_counter(format!("echo-{event_type}")).map_err(|e| SinkError::Other(e.into()))?;
        }
        self.inner.add_custom_event(event_type, payload)
    }

    fn add_timing(&self, event_type: &str, duration_ms: f64, metadata: &Payload) -> Result<(), SinkError> {
        self.inner.add_timing(event_type, duration_ms, metadata)
    }

    fn increment_counter(&self, counter_name: &str) -> Result<(), SinkError> {
        self.inner.increment_counter(counter_name)
    }

    fn set_identity(&self, user_id: &str) -> Result<(), SinkError> {
        self.inner.set_identity(user_id)
    }
}

#[test]
fn test_sink_may_call_back_into_proxy() {
    let proxy = buffering_proxy();
    proxy.record_event("first", Payload::new()).unwrap();

    let sink = Arc::new(EchoSink {
        proxy: OnceLock::new(),
        inner: RecordingSink::new(),
    });
    let _ = sink.proxy.set(Arc::downgrade(&proxy));

    let (done_tx, done_rx) = mpsc::channel();
    {
        let proxy = proxy.clone();
        let sink: Arc<dyn Sink> = sink.clone();
        thread::spawn(move || {
            let _ = done_tx.send(proxy.attach(sink));
        });
    }
    let outcome = done_rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert!(matches!(outcome, AttachOutcome::Attached(report) if report.events == 1 && report.counters == 1));

    // Same call on the live path.
    proxy.record_event("second", Payload::new()).unwrap();
    assert_eq!(sink.inner.counters(), vec!["echo-first", "echo-second"]);
    assert!(proxy.queue_depths().is_empty());
}

proptest! {
    #[test]
    fn prop_counters_drain_in_fifo_order(names in proptest::collection::vec("[a-z]{1,8}", 0..64)) {
        let proxy = buffering_proxy();
        for name in &names {
            proxy.increment_counter(name.clone()).unwrap();
        }
        prop_assert_eq!(proxy.queue_depths().counters, names.len());

        let sink = Arc::new(RecordingSink::new());
        proxy.attach(sink.clone()).unwrap();

        prop_assert_eq!(sink.counters(), names);
        prop_assert!(proxy.queue_depths().is_empty());
    }
}
