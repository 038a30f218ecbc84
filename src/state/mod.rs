//! Per-run state
//!
//! One record per question. Nodes never mutate it directly: each returns a
//! [`StateUpdate`] that the engine merges with [`RunState::apply`].

use crate::models::{FinalOutput, QuestionInput, ScoredChunk, Strategy};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub id: String,
    pub question: String,
    pub format_hint: String,

    /// Set once by the router
    pub strategy: Option<Strategy>,
    /// Set once by retrieval
    pub retrieved_chunks: Vec<ScoredChunk>,
    pub rag_context: String,

    pub constraints_summary: String,
    pub sql_query: String,
    /// `None` until a query succeeds
    pub sql_result: Option<Vec<Map<String, Value>>>,
    pub sql_columns: Vec<String>,
    pub sql_error: Option<String>,
    pub retry_count: u32,
    pub tables_used: Vec<String>,

    pub validation_error: Option<String>,
    pub confidence: f64,
    pub final_output: Option<FinalOutput>,

    #[serde(skip)]
    retrieval_done: bool,
}

impl RunState {
    pub fn new(input: &QuestionInput) -> Self {
        Self {
            id: input.id.clone(),
            question: input.question.clone(),
            format_hint: input.format_hint.clone(),
            strategy: None,
            retrieved_chunks: Vec::new(),
            rag_context: String::new(),
            constraints_summary: String::new(),
            sql_query: String::new(),
            sql_result: None,
            sql_columns: Vec::new(),
            sql_error: None,
            retry_count: 0,
            tables_used: Vec::new(),
            validation_error: None,
            confidence: 1.0,
            final_output: None,
            retrieval_done: false,
        }
    }

    /// Label for traces: empty until routed
    pub fn strategy_label(&self) -> &'static str {
        self.strategy.map(|s| s.as_str()).unwrap_or("")
    }

    /// Merge a node's partial update. Write-once fields keep their first value.
    pub fn apply(mut self, update: StateUpdate) -> Self {
        if let Some(strategy) = update.strategy {
            match self.strategy {
                Some(existing) if existing != strategy => {
                    warn!(%existing, attempted = %strategy, "Strategy is already set; keeping the first value");
                }
                Some(_) => {}
                None => self.strategy = Some(strategy),
            }
        }

        if let Some((chunks, context)) = update.retrieval {
            if self.retrieval_done {
                warn!("Retrieved chunks are already set; ignoring second retrieval");
            } else {
                self.retrieved_chunks = chunks;
                self.rag_context = context;
                self.retrieval_done = true;
            }
        }

        if let Some(summary) = update.constraints_summary {
            self.constraints_summary = summary;
        }
        if let Some(query) = update.sql_query {
            self.sql_query = query;
        }
        if let Some(result) = update.sql_result {
            self.sql_result = result;
        }
        if let Some(columns) = update.sql_columns {
            self.sql_columns = columns;
        }
        if let Some(error) = update.sql_error {
            self.sql_error = error;
        }
        if let Some(retry_count) = update.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(tables) = update.tables_used {
            self.tables_used = tables;
        }
        if let Some(error) = update.validation_error {
            self.validation_error = error;
        }
        if let Some(confidence) = update.confidence {
            self.confidence = confidence;
        }
        if let Some(output) = update.final_output {
            self.final_output = Some(output);
        }

        self
    }
}

/// Partial update produced by one node. `None` leaves a field untouched;
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    strategy: Option<Strategy>,
    retrieval: Option<(Vec<ScoredChunk>, String)>,
    constraints_summary: Option<String>,
    sql_query: Option<String>,
    sql_result: Option<Option<Vec<Map<String, Value>>>>,
    sql_columns: Option<Vec<String>>,
    sql_error: Option<Option<String>>,
    retry_count: Option<u32>,
    tables_used: Option<Vec<String>>,
    validation_error: Option<Option<String>>,
    confidence: Option<f64>,
    final_output: Option<FinalOutput>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn retrieval(mut self, chunks: Vec<ScoredChunk>, rag_context: String) -> Self {
        self.retrieval = Some((chunks, rag_context));
        self
    }

    pub fn constraints_summary(mut self, summary: String) -> Self {
        self.constraints_summary = Some(summary);
        self
    }

    pub fn sql_query(mut self, query: String) -> Self {
        self.sql_query = Some(query);
        self
    }

    pub fn sql_result(mut self, rows: Option<Vec<Map<String, Value>>>) -> Self {
        self.sql_result = Some(rows);
        self
    }

    pub fn sql_columns(mut self, columns: Vec<String>) -> Self {
        self.sql_columns = Some(columns);
        self
    }

    pub fn sql_error(mut self, error: Option<String>) -> Self {
        self.sql_error = Some(error);
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn tables_used(mut self, tables: Vec<String>) -> Self {
        self.tables_used = Some(tables);
        self
    }

    pub fn validation_error(mut self, error: Option<String>) -> Self {
        self.validation_error = Some(error);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn final_output(mut self, output: FinalOutput) -> Self {
        self.final_output = Some(output);
        self
    }
}
