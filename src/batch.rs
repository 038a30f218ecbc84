//! Batch runner
//!
//! JSONL questions in, JSONL answers out. Every valid input line yields exactly
//! one output record, in input order, even when individual runs fail.

use crate::agent::Orchestrator;
use crate::models::{FinalOutput, QuestionInput};
use crate::trace::{trace_digest, write_trace_file};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Parse JSONL questions. Blank lines are skipped; malformed lines are
/// reported and skipped.
pub fn parse_questions(text: &str) -> Vec<QuestionInput> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match serde_json::from_str::<QuestionInput>(line) {
            Ok(question) => Some(question),
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping malformed question");
                None
            }
        })
        .collect()
}

pub async fn read_questions(path: &Path) -> Result<Vec<QuestionInput>> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(parse_questions(&text))
}

/// One JSON object per line
pub async fn write_outputs(path: &Path, outputs: &[FinalOutput]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut body = String::new();
    for output in outputs {
        body.push_str(&serde_json::to_string(output)?);
        body.push('\n');
    }

    tokio::fs::write(path, body).await?;
    Ok(())
}

/// Answer every question with at most `concurrency` runs in flight.
/// Traces go to `<trace_dir>/<id>_trace.json` when a directory is given.
pub async fn run_batch(
    orchestrator: Arc<Orchestrator>,
    questions: Vec<QuestionInput>,
    concurrency: usize,
    trace_dir: Option<PathBuf>,
) -> Vec<FinalOutput> {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = questions.len();

    info!(total, concurrency = concurrency.max(1), "Batch starting");

    let handles: Vec<_> = questions
        .into_iter()
        .map(|question| {
            let orchestrator = orchestrator.clone();
            let permits = permits.clone();
            let trace_dir = trace_dir.clone();
            let id = question.id.clone();

            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let report = orchestrator.run(&question).await;

                if let Some(dir) = trace_dir {
                    match write_trace_file(&dir, &question.id, &report.trace).await {
                        Ok(path) => info!(
                            id = %question.id,
                            path = %path.display(),
                            digest = %trace_digest(&report.trace),
                            "Trace written"
                        ),
                        Err(e) => warn!(id = %question.id, error = %e, "Failed to write trace"),
                    }
                }

                report.output
            });

            (id, handle)
        })
        .collect();

    let mut outputs = Vec::with_capacity(total);
    for (index, (id, handle)) in handles.into_iter().enumerate() {
        let output = match handle.await {
            Ok(output) => output,
            Err(e) => {
                error!(id = %id, error = %e, "Run task aborted");
                FinalOutput::error(id, e)
            }
        };
        info!(done = index + 1, total, id = %output.id, confidence = output.confidence, "Question answered");
        outputs.push(output);
    }

    outputs
}
