//! Strategy Classifier
//!
//! Resolves the router's answer into a [`Strategy`]:
//! - Parses the predicted label leniently ("SQL", "strategy: rag", "hybrid.")
//! - Falls back to keyword heuristics when the label is unusable

use crate::models::Strategy;

/// Words that point at the document corpus (policies, calendars, definitions)
const DOC_KEYWORDS: &[&str] = &[
    "policy", "return", "returns", "calendar", "campaign", "definition", "define",
    "kpi", "according", "document", "documents", "docs", "aov", "margin",
];

/// Words that point at the relational store
const DATA_KEYWORDS: &[&str] = &[
    "how many", "count", "total", "sum", "average", "top", "highest", "lowest",
    "revenue", "sales", "orders", "quantity", "customer", "customers", "product",
    "products", "category", "1996", "1997", "1998",
];

/// Strategy classifier
pub struct StrategyClassifier;

impl StrategyClassifier {
    /// Resolve the router output; an unusable label falls back to [`Self::classify`]
    pub fn resolve(label: &str, question: &str) -> Strategy {
        parse_strategy(label).unwrap_or_else(|| Self::classify(question))
    }

    /// Keyword classification of the question itself
    pub fn classify(question: &str) -> Strategy {
        let text = question.to_lowercase();

        let doc_score = DOC_KEYWORDS.iter().filter(|kw| contains_word(&text, kw)).count();
        let data_score = DATA_KEYWORDS.iter().filter(|kw| contains_word(&text, kw)).count();

        match (doc_score > 0, data_score > 0) {
            (true, false) => Strategy::Rag,
            (false, true) => Strategy::Sql,
            _ => Strategy::Hybrid,
        }
    }
}

/// First whole-word occurrence of `hybrid`, `sql` or `rag`, case-insensitive
pub fn parse_strategy(text: &str) -> Option<Strategy> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find_map(|token| match token {
            "hybrid" => Some(Strategy::Hybrid),
            "sql" => Some(Strategy::Sql),
            "rag" => Some(Strategy::Rag),
            _ => None,
        })
}

/// Whole-word (or whole-phrase) containment
fn contains_word(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(start, _)| {
        let end = start + keyword.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        !before.map_or(false, |c| c.is_alphanumeric()) && !after.map_or(false, |c| c.is_alphanumeric())
    })
}
