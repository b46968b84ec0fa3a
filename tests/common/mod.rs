//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use telemetry_proxy::signal::PackageVersion;
use telemetry_proxy::{Payload, SignalProxy};

pub const VERSION: &str = "0.36.0";
pub const EVENT_TYPE: &str = "commits";
pub const TIMING_EVENT_TYPE: &str = "load";
pub const DURATION_MS: f64 = 42.0;
pub const COUNTER_NAME: &str = "push";
pub const USER: &str = "annthurium";

/// A fresh proxy with no fallback deadline.
pub fn buffering_proxy() -> Arc<SignalProxy> {
    SignalProxy::builder()
        .version(PackageVersion::new(VERSION))
        .without_deadline()
        .build()
        .expect("proxy without deadline always builds")
}

/// A fresh proxy with a fallback deadline. Needs a tokio runtime.
pub fn proxy_with_deadline(after: Duration) -> Arc<SignalProxy> {
    SignalProxy::builder()
        .version(PackageVersion::new(VERSION))
        .fallback_after(after)
        .build()
        .expect("runtime is running")
}

/// `{coAuthorCount: 2}`
pub fn event_payload() -> Payload {
    as_payload(json!({"coAuthorCount": 2}))
}

/// `{coAuthorCount: 2, gitHubPackageVersion: VERSION}`
pub fn augmented_event_payload() -> Payload {
    as_payload(json!({"coAuthorCount": 2, "gitHubPackageVersion": VERSION}))
}

/// `{gitHubPackageVersion: VERSION}`
pub fn version_metadata() -> Payload {
    as_payload(json!({"gitHubPackageVersion": VERSION}))
}

pub fn as_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
