//! Main orchestrator - implements the answering graph
//!
//! ROUTER → RETRIEVE → [EXTRACT → GENERATE SQL → EXECUTE SQL]* → VALIDATE → SYNTHESIZE

pub mod nodes;
pub mod scoring;

use crate::config::AgentConfig;
use crate::models::{FinalOutput, Node, QuestionInput, Strategy, TraceEvent};
use crate::predict::{GeminiPredictor, Predictor};
use crate::retrieval::DocumentIndex;
use crate::state::{RunState, StateUpdate};
use crate::tools::{QueryTool, SqliteTool};
use crate::trace::TraceLog;
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// SQL regeneration attempts after the first failure
pub const MAX_SQL_RETRIES: u32 = 2;

const DEFAULT_TOP_K: usize = 3;

/// Where a run goes after retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterRetrieve {
    ExtractConstraints,
    Synthesize,
}

pub fn route_after_retrieve(strategy: Strategy) -> AfterRetrieve {
    if strategy.uses_sql() {
        AfterRetrieve::ExtractConstraints
    } else {
        AfterRetrieve::Synthesize
    }
}

/// Where a run goes after a SQL execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterExecution {
    Validate,
    Retry,
    GiveUp,
}

pub fn route_after_execution(failed: bool, retry_count: u32) -> AfterExecution {
    match (failed, retry_count < MAX_SQL_RETRIES) {
        (false, _) => AfterExecution::Validate,
        (true, true) => AfterExecution::Retry,
        (true, false) => AfterExecution::GiveUp,
    }
}

/// Result of one run. Always carries an output record; `error` is set when
/// the run failed and `output` is the error record.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output: FinalOutput,
    pub trace: Vec<TraceEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Orchestrator {
    predictor: Arc<dyn Predictor>,
    sql_tool: Arc<dyn QueryTool>,
    index: Arc<DocumentIndex>,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(predictor: Arc<dyn Predictor>, sql_tool: Arc<dyn QueryTool>, index: Arc<DocumentIndex>) -> Self {
        Self {
            predictor,
            sql_tool,
            index,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Wire the production collaborators: Gemini, the SQLite store, the docs directory
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        if config.gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY not set; every question will produce an error record");
        }

        let predictor = GeminiPredictor::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.llm_timeout,
        )?;
        let sql_tool = SqliteTool::open(&config.db_path, config.sql_timeout);
        let index = DocumentIndex::from_dir(&config.docs_dir);

        Ok(Self::new(Arc::new(predictor), Arc::new(sql_tool), Arc::new(index))
            .with_top_k(config.retrieval_top_k))
    }

    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }

    /// Answer one question. Never fails: an engine error becomes an error
    /// record with confidence 0.0, and the partial trace is kept.
    pub async fn run(&self, input: &QuestionInput) -> RunReport {
        let start_time = Instant::now();
        let mut trace = TraceLog::new();

        info!(id = %input.id, question = %input.question, "Orchestrator: starting run");

        let result = self.run_graph(RunState::new(input), &mut trace).await;
        let elapsed_ms = start_time.elapsed().as_millis() as u64;

        match result {
            Ok(state) => {
                let output = state
                    .final_output
                    .unwrap_or_else(|| FinalOutput::error(&input.id, "run ended without an answer"));

                info!(
                    id = %input.id,
                    confidence = output.confidence,
                    nodes = trace.events().len(),
                    elapsed_ms,
                    "Run complete"
                );

                RunReport {
                    output,
                    trace: trace.into_events(),
                    error: None,
                }
            }
            Err(e) => {
                warn!(id = %input.id, error = %e, elapsed_ms, "Run failed");

                RunReport {
                    output: FinalOutput::error(&input.id, &e),
                    trace: trace.into_events(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn run_graph(&self, mut state: RunState, trace: &mut TraceLog) -> Result<RunState> {
        let predictor = self.predictor.as_ref();

        // === ROUTER ===
        trace.record(Node::Router, &state);
        let update = nodes::route(predictor, &state).await?;
        state = state.apply(update);
        let strategy = state.strategy.unwrap_or(Strategy::Hybrid);

        // === RETRIEVE ===
        trace.record(Node::Retrieve, &state);
        let update = nodes::retrieve(&self.index, self.top_k, &state);
        state = state.apply(update);

        if route_after_retrieve(strategy) == AfterRetrieve::ExtractConstraints {
            // === EXTRACT CONSTRAINTS ===
            trace.record(Node::ExtractConstraints, &state);
            let update = nodes::extract_constraints(predictor, &state).await?;
            state = state.apply(update);

            let schema = self.sql_tool.schema().await;

            // === GENERATE → EXECUTE, bounded retries ===
            for attempt in 0..=MAX_SQL_RETRIES {
                trace.record(Node::GenerateSql, &state);
                let update = nodes::generate_sql(predictor, &schema, &state).await?;
                state = state.apply(update);

                trace.record(Node::ExecuteSql, &state);
                let update = nodes::execute_sql(self.sql_tool.as_ref(), &state).await;
                state = state.apply(update);

                match route_after_execution(state.sql_error.is_some(), state.retry_count) {
                    AfterExecution::Validate => {
                        // === VALIDATE ===
                        // Observe-only: both outcomes continue to synthesis
                        trace.record(Node::Validator, &state);
                        let update = nodes::validate(&state);
                        state = state.apply(update);
                        break;
                    }
                    AfterExecution::Retry => {
                        state = state.apply(StateUpdate::new().retry_count(attempt + 1));
                    }
                    AfterExecution::GiveUp => {
                        warn!(id = %state.id, retries = state.retry_count, "Giving up on SQL");
                        break;
                    }
                }
            }
        }

        // === SYNTHESIZE ===
        trace.record(Node::Synthesize, &state);
        let update = nodes::synthesize(predictor, &state).await?;
        state = state.apply(update);

        Ok(state)
    }
}
