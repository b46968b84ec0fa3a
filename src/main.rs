//! Telemetry proxy demo host.
//!
//! # Architecture Overview
//!
//! ```text
//!   signal script (JSON lines)          host timer (--attach-after)
//!            │                                   │
//!            ▼                                   ▼
//!     ┌─────────────┐   buffering    ┌──────────────────────┐
//!     │   replay    │──────────────▶ │     SignalProxy      │
//!     └─────────────┘                │ events/timings/      │
//!                                    │ counters + identity  │
//!                                    └──────────┬───────────┘
//!                                               │ attach / deadline
//!                                               ▼
//!                                  LogSink │ MetricsSink │ NoOpSink
//! ```
//!
//! Signals are replayed into the proxy straight away. The configured sink is
//! attached after `attach_after_secs`; without it the fallback deadline
//! installs the no-op sink. Ctrl-C ends the run.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;

use telemetry_proxy::config::{load_config, validate_config, ConfigError, SinkKind, TelemetryConfig};
use telemetry_proxy::lifecycle::{signals, startup, Shutdown};
use telemetry_proxy::observability::{logging, metrics};
use telemetry_proxy::replay::{replay, ReplayError, ReplayStats};
use telemetry_proxy::SignalProxy;

#[derive(Parser)]
#[command(name = "telemetry-proxy", version)]
#[command(about = "Buffer telemetry until a sink is attached", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON-lines signal script; reads stdin when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Sink to attach (overrides host.sink).
    #[arg(long, value_enum)]
    sink: Option<SinkKind>,

    /// Seconds to wait before attaching (overrides host.attach_after_secs).
    #[arg(long)]
    attach_after: Option<u64>,

    /// Identity to tag signals with.
    #[arg(long)]
    user: Option<String>,
}

impl Cli {
    fn load(&self) -> Result<TelemetryConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => TelemetryConfig::default(),
        };
        if let Some(sink) = self.sink {
            config.host.sink = sink;
        }
        if let Some(secs) = self.attach_after {
            config.host.attach_after_secs = Some(secs);
        }
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

async fn replay_input(input: Option<&Path>, proxy: &SignalProxy) -> Result<ReplayStats, ReplayError> {
    match input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            replay(BufReader::new(file), proxy).await
        }
        None => replay(BufReader::new(tokio::io::stdin()), proxy).await,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_tracing(&config.observability);
    tracing::info!("telemetry-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        // Validated above.
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr);
        }
    }

    let shutdown = Shutdown::new();
    let mut stop = shutdown.subscribe();
    tokio::spawn(signals::trigger_on_signal(shutdown.clone()));

    let proxy = startup::build_proxy(&config, &shutdown)?;

    if let Some(user) = &cli.user {
        proxy.set_identity(user.clone())?;
    }

    let attach_task = match (config.host.attach_after_secs, startup::make_sink(config.host.sink)) {
        (Some(secs), Some(sink)) => {
            tracing::info!(sink = sink.name(), after_secs = secs, "Sink attach scheduled");
            Some(tokio::spawn(startup::attach_after(
                proxy.clone(),
                sink,
                Duration::from_secs(secs),
                shutdown.subscribe(),
            )))
        }
        _ => {
            tracing::info!(
                fallback_timeout_secs = config.proxy.fallback_timeout_secs,
                "No sink scheduled, waiting for fallback deadline"
            );
            None
        }
    };

    let stopped_early = tokio::select! {
        result = replay_input(cli.input.as_deref(), &proxy) => {
            let stats: ReplayStats = result?;
            tracing::info!(
                applied = stats.applied,
                depths = ?proxy.queue_depths(),
                "Script replayed, press Ctrl-C to exit"
            );
            false
        }
        _ = stop.recv() => true,
    };

    if !stopped_early {
        let _ = stop.recv().await;
    }

    if let Some(task) = attach_task {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Attach task failed");
        }
    }

    tracing::info!(
        state = ?proxy.state(),
        sink = ?proxy.attached_sink(),
        depths = ?proxy.queue_depths(),
        "Shutdown complete"
    );
    Ok(())
}
