//! Shutdown coordination for the host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::signal::SignalProxyBuilder;

/// Coordinator for graceful shutdown.
///
/// Clones share one broadcast channel. The proxy's fallback deadline and the
/// delayed attach task subscribe to it; so does the demo host's main loop.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to the shutdown signal.
    ///
    /// A receiver created after [`trigger`](Self::trigger) never sees the
    /// broadcast; check [`is_triggered`](Self::is_triggered) first.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Tie a proxy's fallback deadline to this coordinator.
    pub fn bind(&self, builder: SignalProxyBuilder) -> SignalProxyBuilder {
        builder.shutdown(self.subscribe())
    }

    /// Broadcast shutdown. Only the first call sends.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
