//! Package-version augmentation.
//!
//! The version string is fixed when the proxy is built and merged into every
//! event payload and timing metadata map. The version field is inserted after
//! the caller's fields, so it wins on a key collision.

use serde_json::Value;

use crate::signal::types::Payload;

/// Key the version is stored under unless configured otherwise.
pub const VERSION_KEY: &str = "gitHubPackageVersion";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    key: String,
    version: String,
}

impl PackageVersion {
    /// Version stored under [`VERSION_KEY`].
    pub fn new(version: impl Into<String>) -> Self {
        Self::with_key(VERSION_KEY, version)
    }

    pub fn with_key(key: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: version.into(),
        }
    }

    /// The version of this crate, for hosts that have no package metadata of their own.
    pub fn of_this_crate() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Merge the version field into a caller payload.
    pub fn augment(&self, mut payload: Payload) -> Payload {
        payload.insert(self.key.clone(), Value::String(self.version.clone()));
        payload
    }

    /// Metadata map holding only the version field.
    pub fn metadata(&self) -> Payload {
        self.augment(Payload::new())
    }
}

impl Default for PackageVersion {
    fn default() -> Self {
        Self::of_this_crate()
    }
}
