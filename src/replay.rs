//! JSON-lines signal scripts for the demo host.
//!
//! Each non-blank line that does not start with `#` is one command:
//!
//! ```text
//! {"kind":"event","event_type":"commits","payload":{"coAuthorCount":2}}
//! {"kind":"timing","event_type":"load","duration_ms":42}
//! {"kind":"counter","name":"push"}
//! {"kind":"identity","user_id":"annthurium"}
//! ```

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::signal::{Payload, ProxyError, SignalProxy};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignalCommand {
    Event {
        event_type: String,
        #[serde(default)]
        payload: Payload,
    },
    Timing {
        event_type: String,
        duration_ms: f64,
    },
    Counter {
        name: String,
    },
    Identity {
        user_id: String,
    },
}

impl SignalCommand {
    /// Feed this command into the proxy.
    pub fn apply(self, proxy: &SignalProxy) -> Result<(), ProxyError> {
        match self {
            SignalCommand::Event { event_type, payload } => proxy.record_event(event_type, payload),
            SignalCommand::Timing { event_type, duration_ms } => proxy.record_timing(event_type, duration_ms),
            SignalCommand::Counter { name } => proxy.increment_counter(name),
            SignalCommand::Identity { user_id } => proxy.set_identity(user_id),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse line `number` of a script. Blank lines and `#` comments yield `None`.
pub fn parse_line(number: usize, line: &str) -> Result<Option<SignalCommand>, ReplayError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| ReplayError::Parse { line: number, source })
}

/// Totals from one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub sink_errors: usize,
}

/// Read every command from `reader` and apply it to the proxy.
///
/// A malformed line aborts the replay. A sink error is logged and counted,
/// and the replay moves on to the next line.
pub async fn replay<R>(reader: R, proxy: &SignalProxy) -> Result<ReplayStats, ReplayError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = ReplayStats::default();
    let mut number = 0;

    while let Some(line) = lines.next_line().await? {
        number += 1;
        let Some(command) = parse_line(number, &line)? else {
            continue;
        };

        match command.apply(proxy) {
            Ok(()) => stats.applied += 1,
            Err(e) => {
                tracing::warn!(line = number, error = %e, "Signal rejected by sink");
                stats.sink_errors += 1;
            }
        }
    }

    tracing::info!(applied = stats.applied, sink_errors = stats.sink_errors, "Replay finished");
    Ok(stats)
}
