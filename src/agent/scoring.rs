//! Citation merging and confidence scoring for the terminal step

use std::collections::HashSet;

/// Merge citation sources in priority order: SQL tables, retrieved chunk ids,
/// then model-asserted extras. First occurrence wins; blanks are dropped.
pub fn merge_citations(tables: &[String], chunk_ids: &[String], asserted: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();

    tables
        .iter()
        .chain(chunk_ids)
        .chain(asserted)
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.to_string()))
        .map(str::to_string)
        .collect()
}

/// Terminal-state conditions that reduce confidence
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfidenceSignals {
    pub sql_error: bool,
    pub retry_count: u32,
    pub no_citations: bool,
    pub validation_error: bool,
}

impl ConfidenceSignals {
    /// Start at 1.0 and subtract each independent deduction, clamped to [0, 1]
    pub fn score(&self) -> f64 {
        let mut confidence = 1.0;

        if self.sql_error {
            confidence -= 0.3;
        }
        confidence -= 0.2 * self.retry_count as f64;
        if self.no_citations {
            confidence -= 0.2;
        }
        if self.validation_error {
            confidence -= 0.3;
        }

        round_score(confidence.clamp(0.0, 1.0))
    }
}

/// Drop floating-point residue (1.0 - 0.3 - 0.4 = 0.30000000000000004)
fn round_score(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
