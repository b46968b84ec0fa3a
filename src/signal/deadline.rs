//! Fallback deadline.
//!
//! # Responsibilities
//! - Spawn one timer task when the proxy is built
//! - On expiry, attach the no-op sink if the host never attached one
//! - Stop early on host attach, proxy drop, or shutdown broadcast
//!
//! # Design Decisions
//! - The task holds a `Weak` so it never keeps a dropped proxy alive
//! - Cancellation is best effort; `SignalProxy::expire` re-checks state anyway

use std::sync::{Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::signal::proxy::SignalProxy;
use crate::signal::types::ProxyError;

/// Interval after which an unattached proxy falls back to the no-op sink.
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Spawn the deadline task on the current tokio runtime.
pub(crate) fn arm(
    proxy: Weak<SignalProxy>,
    after: Duration,
    shutdown: Option<broadcast::Receiver<()>>,
) -> Result<JoinHandle<()>, ProxyError> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| ProxyError::NoRuntime)?;
    tracing::debug!(after_secs = after.as_secs_f64(), "Fallback deadline armed");
    Ok(runtime.spawn(run(proxy, after, shutdown)))
}

async fn run(proxy: Weak<SignalProxy>, after: Duration, shutdown: Option<broadcast::Receiver<()>>) {
    match shutdown {
        Some(mut shutdown) => {
            tokio::select! {
                _ = time::sleep(after) => {}
                _ = shutdown.recv() => {
                    tracing::debug!("Fallback deadline received shutdown signal, exiting");
                    return;
                }
            }
        }
        None => time::sleep(after).await,
    }

    match proxy.upgrade() {
        Some(proxy) => proxy.expire(),
        None => tracing::trace!("Proxy dropped before deadline"),
    }
}

/// Owner of the deadline task handle.
#[derive(Debug, Default)]
pub(crate) struct DeadlineGuard {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeadlineGuard {
    pub(crate) fn set(&self, handle: JoinHandle<()>) {
        *self.lock() = Some(handle);
    }

    /// Abort the pending task. Returns true if one was still running.
    pub(crate) fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }

    /// Forget the handle without aborting. Used from inside the task itself.
    pub(crate) fn disarm(&self) {
        self.lock().take();
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}
