//! Run trace logging
//!
//! Every node execution is appended to an ordered per-run log. The log is
//! write-only from the engine's point of view and never affects control flow.

use crate::models::{Node, TraceEvent};
use crate::state::RunState;
use crate::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ordered trace of one run
#[derive(Debug, Default)]
pub struct TraceLog {
    events: Vec<TraceEvent>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the key state fields as `node` starts
    pub fn record(&mut self, node: Node, state: &RunState) {
        let event = TraceEvent {
            node,
            question: state.question.clone(),
            strategy: state.strategy_label().to_string(),
            sql_query: (!state.sql_query.is_empty()).then(|| state.sql_query.clone()),
            sql_error: state.sql_error.clone(),
            retries: state.retry_count,
            recorded_at: Utc::now(),
        };

        debug!(
            id = %state.id,
            node = %node,
            strategy = %event.strategy,
            retries = event.retries,
            sql_error = event.sql_error.as_deref().unwrap_or(""),
            "Node started"
        );

        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    /// Node names in visit order
    pub fn nodes(&self) -> Vec<Node> {
        self.events.iter().map(|e| e.node).collect()
    }
}

/// SHA256 over the serialized events, for correlating persisted traces with logs.
/// Streams JSON directly into the hasher.
pub fn trace_digest(events: &[TraceEvent]) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), events).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Persist a run's trace as `<dir>/<id>_trace.json`
pub async fn write_trace_file(dir: &Path, id: &str, events: &[TraceEvent]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(format!("{}_trace.json", sanitize_file_stem(id)));
    let body = serde_json::to_vec_pretty(events)?;
    tokio::fs::write(&path, body).await?;

    Ok(path)
}

/// Question ids come from user input; keep them to a single path component
fn sanitize_file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "unnamed".to_string()
    } else {
        stem.to_string()
    }
}
