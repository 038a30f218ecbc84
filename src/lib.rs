//! Retail Analytics Copilot
//!
//! Answers natural-language analytical questions over a retail store by
//! combining:
//! - SQL generation and execution against a SQLite database
//! - BM25 retrieval over a markdown document corpus
//! - A bounded-retry orchestration graph that synthesizes one typed answer
//!   with citations and a confidence score
//!
//! GRAPH:
//! ROUTER → RETRIEVE → [EXTRACT → GENERATE SQL → EXECUTE SQL]* → VALIDATE → SYNTHESIZE

pub mod agent;
pub mod api;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gemini;
pub mod models;
pub mod predict;
pub mod retrieval;
pub mod state;
pub mod tools;
pub mod trace;
pub mod verification;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::{Orchestrator, RunReport};
pub use classifier::StrategyClassifier;
