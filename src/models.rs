//! Core data models for the retail analytics copilot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

//
// ================= Enums =================
//

/// Run-level answering strategy chosen by the router
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sql,
    Rag,
    Hybrid,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sql => "sql",
            Strategy::Rag => "rag",
            Strategy::Hybrid => "hybrid",
        }
    }

    /// Whether the SQL branch of the graph runs for this strategy
    pub fn uses_sql(&self) -> bool {
        !matches!(self, Strategy::Rag)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Graph nodes, in the order a full hybrid run visits them
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Router,
    Retrieve,
    ExtractConstraints,
    GenerateSql,
    ExecuteSql,
    Validator,
    Synthesize,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Router => "router",
            Node::Retrieve => "retrieve",
            Node::ExtractConstraints => "extract_constraints",
            Node::GenerateSql => "generate_sql",
            Node::ExecuteSql => "execute_sql",
            Node::Validator => "validator",
            Node::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Documents =================
//

/// A paragraph of indexed document text. Immutable once indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    /// `<document-name>::chunk<ordinal>`
    pub id: String,
    pub content: String,
    pub source: String,
}

/// A chunk returned by a retrieval query, annotated with its BM25 score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub content: String,
    pub source: String,
    pub score: f64,
}

impl ScoredChunk {
    pub fn from_chunk(chunk: &DocumentChunk, score: f64) -> Self {
        Self {
            id: chunk.id.clone(),
            content: chunk.content.clone(),
            source: chunk.source.clone(),
            score,
        }
    }
}

//
// ================= Tool I/O =================
//

/// Structured report of one SQL execution attempt.
/// Failures are reported here, never raised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryOutcome {
    pub success: bool,
    #[serde(default)]
    pub rows: Vec<Map<String, Value>>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub tables_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn success(rows: Vec<Map<String, Value>>, columns: Vec<String>, tables_used: Vec<String>) -> Self {
        Self {
            success: true,
            rows,
            columns,
            tables_used,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            columns: Vec::new(),
            tables_used: Vec::new(),
            error: Some(error.into()),
        }
    }
}

//
// ================= Questions & Answers =================
//

/// One line of a batch input file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionInput {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub format_hint: String,
}

/// The per-question answer record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalOutput {
    pub id: String,
    pub final_answer: String,
    pub sql: String,
    pub confidence: f64,
    pub explanation: String,
    pub citations: Vec<String>,
}

impl FinalOutput {
    /// Record emitted when a run fails outright
    pub fn error(id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self {
            id: id.into(),
            final_answer: String::new(),
            sql: String::new(),
            confidence: 0.0,
            explanation: format!("Error during processing: {}", message),
            citations: Vec::new(),
        }
    }
}

//
// ================= Trace =================
//

/// Snapshot recorded every time a node runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceEvent {
    pub node: Node,
    pub question: String,
    /// Empty until the router has run
    pub strategy: String,
    pub sql_query: Option<String>,
    pub sql_error: Option<String>,
    pub retries: u32,
    pub recorded_at: DateTime<Utc>,
}
