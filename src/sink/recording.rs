//! In-memory sink for tests.
//!
//! Keeps every call in arrival order so tests can assert on exact arguments
//! and ordering. Can be switched into a failing mode to exercise error paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::signal::types::Payload;
use crate::sink::{Sink, SinkError};

/// One call received by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    CustomEvent { event_type: String, payload: Payload },
    Timing { event_type: String, duration_ms: f64, metadata: Payload },
    Counter { name: String },
    Identity { user_id: String },
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records every call and then fails it.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All calls in arrival order.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn events(&self) -> Vec<(String, Payload)> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::CustomEvent { event_type, payload } => Some((event_type.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn timings(&self) -> Vec<(String, f64, Payload)> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Timing { event_type, duration_ms, metadata } => {
                    Some((event_type.clone(), *duration_ms, metadata.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn counters(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Counter { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn identities(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Identity { user_id } => Some(user_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SinkCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: SinkCall) -> Result<(), SinkError> {
        let kind = match &call {
            SinkCall::CustomEvent { .. } => "event",
            SinkCall::Timing { .. } => "timing",
            SinkCall::Counter { .. } => "counter",
            SinkCall::Identity { .. } => "identity",
        };
        self.lock().push(call);

        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Rejected {
                kind,
                reason: "recording sink set to fail".to_string(),
            });
        }
        Ok(())
    }
}

impl Sink for RecordingSink {
    fn add_custom_event(&self, event_type: &str, payload: &Payload) -> Result<(), SinkError> {
        self.record(SinkCall::CustomEvent {
            event_type: event_type.to_string(),
            payload: payload.clone(),
        })
    }

    fn add_timing(&self, event_type: &str, duration_ms: f64, metadata: &Payload) -> Result<(), SinkError> {
        self.record(SinkCall::Timing {
            event_type: event_type.to_string(),
            duration_ms,
            metadata: metadata.clone(),
        })
    }

    fn increment_counter(&self, counter_name: &str) -> Result<(), SinkError> {
        self.record(SinkCall::Counter { name: counter_name.to_string() })
    }

    fn set_identity(&self, user_id: &str) -> Result<(), SinkError> {
        self.record(SinkCall::Identity { user_id: user_id.to_string() })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
