//! Prediction steps
//!
//! Every language-model step is a call `predict(signature, inputs) -> outputs`
//! over named text fields. Outputs are untrusted: they may be slow,
//! non-deterministic, or malformed, and are parsed defensively here.

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub mod gemini;
#[cfg(test)]
mod scripted;

pub use gemini::GeminiPredictor;
#[cfg(test)]
pub use scripted::ScriptedPredictor;

/// A named field in a signature
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub desc: &'static str,
}

/// Named-input / named-output contract for one prediction step
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub name: &'static str,
    pub instructions: &'static str,
    pub inputs: &'static [FieldSpec],
    pub outputs: &'static [FieldSpec],
}

pub const ROUTE: Signature = Signature {
    name: "route",
    instructions: "Classify the user question into a strategy: 'sql', 'rag', or 'hybrid'.",
    inputs: &[FieldSpec { name: "question", desc: "" }],
    outputs: &[FieldSpec { name: "strategy", desc: "One of: sql, rag, hybrid" }],
};

pub const EXTRACT_CONSTRAINTS: Signature = Signature {
    name: "extract_constraints",
    instructions: "Extract structured constraints from retrieved documents for SQL generation. \
                   Identify: date ranges, KPI formulas, category names, entity IDs.",
    inputs: &[
        FieldSpec { name: "question", desc: "" },
        FieldSpec { name: "rag_context", desc: "Retrieved document chunks" },
    ],
    outputs: &[
        FieldSpec { name: "date_ranges", desc: "Extracted date ranges (e.g., '1997-06-01 to 1997-06-30')" },
        FieldSpec { name: "kpi_formulas", desc: "Relevant KPI calculation formulas" },
        FieldSpec { name: "categories", desc: "Product categories or entity names mentioned" },
        FieldSpec { name: "constraints_summary", desc: "Brief summary of all constraints" },
    ],
};

pub const GENERATE_SQL: Signature = Signature {
    name: "generate_sql",
    instructions: "Generate a VALID SQLite query. Use SQLite functions only: \
                   strftime('%Y', OrderDate) = '1997' for years, strftime('%m', OrderDate) = '06' for months, \
                   OrderDate >= '1997-01-01' AND OrderDate <= '1997-12-31' for ranges. \
                   NEVER use DATEPART, YEAR() or MONTH(). \
                   Tables: orders, order_items, products, customers, categories.",
    inputs: &[
        FieldSpec { name: "schema_context", desc: "Table schemas and relations" },
        FieldSpec { name: "question", desc: "" },
        FieldSpec { name: "constraints", desc: "Extracted constraints (dates, KPIs, categories)" },
    ],
    outputs: &[FieldSpec {
        name: "sql_query",
        desc: "Valid SQLite query. No markdown. Use strftime() for dates.",
    }],
};

pub const SYNTHESIZE: Signature = Signature {
    name: "synthesize",
    instructions: "Answer the question based on SQL results and context. \
                   Return a precise answer matching the format hint.",
    inputs: &[
        FieldSpec { name: "question", desc: "" },
        FieldSpec { name: "sql_query", desc: "" },
        FieldSpec { name: "sql_result", desc: "" },
        FieldSpec { name: "rag_context", desc: "" },
        FieldSpec { name: "format_hint", desc: "e.g. 'float', 'int', 'list[dict]'" },
    ],
    outputs: &[
        FieldSpec { name: "final_answer", desc: "The answer matching the format_hint type" },
        FieldSpec { name: "explanation", desc: "Brief explanation < 2 sentences" },
        FieldSpec { name: "citations", desc: "List of tables used (e.g. Orders) and doc chunk IDs" },
    ],
};

/// Named text inputs for one call
pub type Fields = BTreeMap<String, String>;

/// Build [`Fields`] from `(name, value)` pairs
pub fn fields<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> Fields {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Named outputs of one call, as returned by the model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prediction {
    outputs: HashMap<String, Value>,
}

impl Prediction {
    pub fn new(outputs: HashMap<String, Value>) -> Self {
        Self { outputs }
    }

    /// Convenience for scripted outputs that are all plain strings
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            outputs: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        }
    }

    pub fn with_value(mut self, name: &str, value: Value) -> Self {
        self.outputs.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }

    /// Field as text. Missing/null → empty, strings as-is (trimmed),
    /// anything structured → compact JSON.
    pub fn text(&self, name: &str) -> String {
        match self.outputs.get(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// Trait for the language-model boundary
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, signature: &Signature, inputs: &Fields) -> Result<Prediction>;
}

//
// ================= Defensive parsing =================
//

/// The citations field arrives as a single string, a list, or garbage
#[derive(Debug, Clone, PartialEq)]
pub enum CitationField {
    Single(String),
    List(Vec<String>),
    Unparsable,
}

impl CitationField {
    pub fn parse(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => CitationField::List(Vec::new()),
            Some(Value::Array(items)) => CitationField::List(items.iter().filter_map(scalar_text).collect()),
            Some(Value::String(s)) => Self::parse_str(s),
            Some(_) => CitationField::Unparsable,
        }
    }

    fn parse_str(raw: &str) -> Self {
        let text = raw.trim();
        if text.starts_with('[') {
            return match serde_json::from_str::<Value>(text) {
                Ok(Value::Array(items)) => CitationField::List(items.iter().filter_map(scalar_text).collect()),
                _ => CitationField::Unparsable,
            };
        }
        if text.contains(',') || text.contains('\n') {
            return CitationField::List(
                text.split(|c| c == ',' || c == '\n')
                    .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                    .collect(),
            );
        }
        CitationField::Single(text.to_string())
    }

    /// Canonical ordered sequence; unparsable → empty, blanks dropped
    pub fn into_vec(self) -> Vec<String> {
        let items = match self {
            CitationField::Single(s) => vec![s],
            CitationField::List(items) => items,
            CitationField::Unparsable => Vec::new(),
        };
        items.into_iter().filter(|s| !s.trim().is_empty()).collect()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Strip incidental markdown fences around generated SQL
pub fn clean_sql(raw: &str) -> String {
    let text = raw.trim();

    let Some(start) = text.find("```") else {
        return text.to_string();
    };

    let after_fence = &text[start + 3..];
    // Skip the language tag on the opening fence line
    let body = match after_fence.find('\n') {
        Some(newline) if after_fence[..newline].trim().chars().all(|c| c.is_ascii_alphabetic()) => {
            &after_fence[newline + 1..]
        }
        _ => after_fence
            .trim_start_matches("sql")
            .trim_start_matches("SQL"),
    };

    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };

    body.trim().to_string()
}

/// Pull the first JSON object out of a model reply (fenced or surrounded by prose)
pub fn extract_json_object(response: &str) -> Option<serde_json::Map<String, Value>> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(cleaned) {
        return Some(map);
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
