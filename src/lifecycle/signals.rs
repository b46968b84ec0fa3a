//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT/SIGTERM (Ctrl-C on every platform)
//! - Translate the first one into a `Shutdown::trigger`
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)

use crate::lifecycle::Shutdown;

/// Resolve once the process is asked to stop.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

/// Wait for an OS signal, then broadcast shutdown.
///
/// Returns early without triggering if something else already did.
pub async fn trigger_on_signal(shutdown: Shutdown) {
    let mut rx = shutdown.subscribe();
    if shutdown.is_triggered() {
        return;
    }
    tokio::select! {
        _ = shutdown_signal() => shutdown.trigger(),
        _ = rx.recv() => tracing::debug!("Shutdown triggered elsewhere, no longer waiting for signals"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_returns_when_triggered_elsewhere() {
        let shutdown = Shutdown::new();
        let waiter = tokio::spawn(trigger_on_signal(shutdown.clone()));
        tokio::task::yield_now().await;

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_already_triggered_returns_at_once() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        trigger_on_signal(shutdown).await;
    }
}
