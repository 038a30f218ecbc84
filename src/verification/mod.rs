//! Answer-shape verification
//!
//! Rules-based check of a final answer against its `format_hint`.
//! Deterministic and observe-only: a failure is reported, never enforced.

use tracing::debug;

/// Expected shape of an answer, derived from the free-text hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    Int,
    Float,
    /// Hints starting with `{` or `list[`
    Structured,
    /// Anything else: no check
    Text,
}

impl FormatHint {
    pub fn parse(hint: &str) -> Self {
        let hint = hint.trim();
        match hint {
            "int" => FormatHint::Int,
            "float" => FormatHint::Float,
            _ if hint.starts_with('{') || hint.starts_with("list[") => FormatHint::Structured,
            _ => FormatHint::Text,
        }
    }

    /// `None` when `answer` satisfies the hint, otherwise a description of the failure
    pub fn check(&self, answer: &str) -> Option<String> {
        let answer = answer.trim();
        let failure = match self {
            FormatHint::Int => answer
                .parse::<i64>()
                .err()
                .map(|e| format!("expected int, got {:?}: {}", answer, e)),
            FormatHint::Float => answer
                .parse::<f64>()
                .err()
                .map(|e| format!("expected float, got {:?}: {}", answer, e)),
            FormatHint::Structured => serde_json::from_str::<serde_json::Value>(answer)
                .err()
                .map(|e| format!("expected structured data: {}", e)),
            FormatHint::Text => None,
        };

        failure.map(|reason| format!("Format validation failed: {}", reason))
    }
}

/// Validate a previously produced answer. With no prior answer there is
/// nothing to check and validation passes.
pub fn validate_answer(format_hint: &str, previous_answer: Option<&str>) -> Option<String> {
    let hint = FormatHint::parse(format_hint);
    let result = previous_answer.and_then(|answer| hint.check(answer));

    debug!(
        ?hint,
        checked = previous_answer.is_some(),
        passed = result.is_none(),
        "Validation completed"
    );

    result
}

//
// ================= Tests =================
//
