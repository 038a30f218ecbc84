//! Graph nodes
//!
//! Each node reads the run state and returns a partial [`StateUpdate`].
//! Nodes that call the predictor may fail; tool nodes report failures in state.

use super::scoring::{merge_citations, ConfidenceSignals};
use crate::classifier::StrategyClassifier;
use crate::models::{FinalOutput, ScoredChunk};
use crate::predict::{
    clean_sql, fields, CitationField, Predictor, EXTRACT_CONSTRAINTS, GENERATE_SQL, ROUTE, SYNTHESIZE,
};
use crate::retrieval::DocumentIndex;
use crate::state::{RunState, StateUpdate};
use crate::tools::QueryTool;
use crate::verification::validate_answer;
use crate::Result;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

pub const NO_CONSTRAINTS: &str = "No specific constraints extracted.";

/// Rows passed to the synthesizer
const MAX_RESULT_ROWS: usize = 50;

pub async fn route(predictor: &dyn Predictor, state: &RunState) -> Result<StateUpdate> {
    let prediction = predictor
        .predict(&ROUTE, &fields([("question", state.question.clone())]))
        .await?;

    let label = prediction.text("strategy");
    let strategy = StrategyClassifier::resolve(&label, &state.question);

    info!(id = %state.id, %strategy, label = %label, "Question routed");
    Ok(StateUpdate::new().strategy(strategy))
}

pub fn retrieve(index: &DocumentIndex, top_k: usize, state: &RunState) -> StateUpdate {
    let chunks = index.search(&state.question, top_k);
    let context = render_rag_context(&chunks);

    debug!(
        id = %state.id,
        chunks = chunks.len(),
        top = chunks.first().map(|c| c.id.as_str()).unwrap_or(""),
        "Retrieved document chunks"
    );

    StateUpdate::new().retrieval(chunks, context)
}

/// `[<id>] (score: <2dp>) <content>` per chunk, blank-line separated
pub fn render_rag_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[{}] (score: {:.2}) {}\n\n", c.id, c.score, c.content))
        .collect()
}

pub async fn extract_constraints(predictor: &dyn Predictor, state: &RunState) -> Result<StateUpdate> {
    if state.retrieved_chunks.is_empty() {
        return Ok(StateUpdate::new().constraints_summary(NO_CONSTRAINTS.to_string()));
    }

    let prediction = predictor
        .predict(
            &EXTRACT_CONSTRAINTS,
            &fields([
                ("question", state.question.clone()),
                ("rag_context", state.rag_context.clone()),
            ]),
        )
        .await?;

    let summary = format!(
        "Date Ranges: {}\nKPI Formulas: {}\nCategories/Entities: {}\nSummary: {}",
        prediction.text("date_ranges"),
        prediction.text("kpi_formulas"),
        prediction.text("categories"),
        prediction.text("constraints_summary"),
    );

    Ok(StateUpdate::new().constraints_summary(summary))
}

/// Constraints plus the failing query and error when this is a retry
pub fn sql_generation_context(state: &RunState) -> String {
    match (&state.sql_error, state.retry_count) {
        (Some(error), retries) if retries > 0 => format!(
            "{}\nPrevious error: {}\nPrevious query: {}",
            state.constraints_summary, error, state.sql_query
        ),
        _ => state.constraints_summary.clone(),
    }
}

pub async fn generate_sql(predictor: &dyn Predictor, schema: &str, state: &RunState) -> Result<StateUpdate> {
    let prediction = predictor
        .predict(
            &GENERATE_SQL,
            &fields([
                ("schema_context", schema.to_string()),
                ("question", state.question.clone()),
                ("constraints", sql_generation_context(state)),
            ]),
        )
        .await?;

    let query = clean_sql(&prediction.text("sql_query"));
    debug!(id = %state.id, attempt = state.retry_count + 1, sql = %query, "SQL generated");

    Ok(StateUpdate::new().sql_query(query))
}

pub async fn execute_sql(tool: &dyn QueryTool, state: &RunState) -> StateUpdate {
    let outcome = tool.execute(&state.sql_query).await;

    if outcome.success {
        info!(
            id = %state.id,
            rows = outcome.rows.len(),
            tables = ?outcome.tables_used,
            "SQL executed"
        );
        StateUpdate::new()
            .sql_result(Some(outcome.rows))
            .sql_columns(outcome.columns)
            .sql_error(None)
            .tables_used(outcome.tables_used)
    } else {
        let error = outcome.error.unwrap_or_else(|| "unknown SQL error".to_string());
        warn!(id = %state.id, retries = state.retry_count, error = %error, "SQL execution failed");
        StateUpdate::new()
            .sql_result(None)
            .sql_columns(Vec::new())
            .sql_error(Some(error))
            .tables_used(Vec::new())
    }
}

pub fn validate(state: &RunState) -> StateUpdate {
    let previous = state.final_output.as_ref().map(|o| o.final_answer.as_str());
    let error = validate_answer(&state.format_hint, previous);

    if let Some(reason) = &error {
        warn!(id = %state.id, format_hint = %state.format_hint, reason = %reason, "Answer failed validation");
    }

    StateUpdate::new().validation_error(error)
}

/// JSON rows for the synthesizer, capped at [`MAX_RESULT_ROWS`]
pub fn render_sql_result(rows: Option<&Vec<Map<String, Value>>>) -> String {
    let Some(rows) = rows else {
        return "[]".to_string();
    };

    let shown = &rows[..rows.len().min(MAX_RESULT_ROWS)];
    let rendered = serde_json::to_string(shown).unwrap_or_else(|_| "[]".to_string());

    if rows.len() > MAX_RESULT_ROWS {
        format!("{}\n({} rows total, first {} shown)", rendered, rows.len(), MAX_RESULT_ROWS)
    } else {
        rendered
    }
}

pub async fn synthesize(predictor: &dyn Predictor, state: &RunState) -> Result<StateUpdate> {
    let prediction = predictor
        .predict(
            &SYNTHESIZE,
            &fields([
                ("question", state.question.clone()),
                ("sql_query", state.sql_query.clone()),
                ("sql_result", render_sql_result(state.sql_result.as_ref())),
                ("rag_context", state.rag_context.clone()),
                ("format_hint", state.format_hint.clone()),
            ]),
        )
        .await?;

    let chunk_ids: Vec<String> = state.retrieved_chunks.iter().map(|c| c.id.clone()).collect();
    let asserted = CitationField::parse(prediction.get("citations")).into_vec();
    let citations = merge_citations(&state.tables_used, &chunk_ids, &asserted);

    let confidence = ConfidenceSignals {
        sql_error: state.sql_error.is_some(),
        retry_count: state.retry_count,
        no_citations: citations.is_empty(),
        validation_error: state.validation_error.is_some(),
    }
    .score();

    info!(
        id = %state.id,
        confidence,
        citations = citations.len(),
        "Answer synthesized"
    );

    let output = FinalOutput {
        id: state.id.clone(),
        final_answer: prediction.text("final_answer"),
        sql: state.sql_query.clone(),
        confidence,
        explanation: prediction.text("explanation"),
        citations,
    };

    Ok(StateUpdate::new().confidence(confidence).final_output(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionInput, Strategy};
    use crate::predict::{Prediction, ScriptedPredictor};
    use crate::test_support::{fixture_index, fixture_tool};
    use serde_json::json;

    fn state(question: &str, format_hint: &str) -> RunState {
        RunState::new(&QuestionInput {
            id: "q1".to_string(),
            question: question.to_string(),
            format_hint: format_hint.to_string(),
        })
    }

    #[tokio::test]
    async fn test_route_falls_back_on_malformed_label() {
        let predictor = ScriptedPredictor::new()
            .push(&ROUTE, Prediction::from_pairs([("strategy", "I am not sure")]));
        let run = state("What is the return window for unopened Beverages?", "int");

        let update = route(&predictor, &run).await.unwrap();
        let run = run.apply(update);
        assert_eq!(run.strategy, Some(Strategy::Rag));
    }

    #[test]
    fn test_retrieve_renders_context() {
        let run = state("Summer Beverages 1997 dates", "str");
        let update = retrieve(&fixture_index(), 3, &run);
        let run = run.apply(update);

        assert!(!run.retrieved_chunks.is_empty());
        assert!(run.retrieved_chunks.len() <= 3);
        assert!(run
            .rag_context
            .starts_with(&format!("[{}] (score: ", run.retrieved_chunks[0].id)));
    }

    #[tokio::test]
    async fn test_extract_constraints_skips_prediction_without_chunks() {
        let predictor = ScriptedPredictor::new();
        let run = state("anything", "str");

        let update = extract_constraints(&predictor, &run).await.unwrap();
        let run = run.apply(update);
        assert_eq!(run.constraints_summary, NO_CONSTRAINTS);
        assert!(predictor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_extract_constraints_composes_summary() {
        let predictor = ScriptedPredictor::new().push(
            &EXTRACT_CONSTRAINTS,
            Prediction::from_pairs([
                ("date_ranges", "1997-06-01 to 1997-06-30"),
                ("kpi_formulas", "AOV"),
                ("categories", "Beverages"),
                ("constraints_summary", "Summer campaign"),
            ]),
        );
        let run = state("Summer Beverages 1997 dates", "str");
        let update = retrieve(&fixture_index(), 3, &run);
        let run = run.apply(update);

        let update = extract_constraints(&predictor, &run).await.unwrap();
        let run = run.apply(update);
        assert_eq!(
            run.constraints_summary,
            "Date Ranges: 1997-06-01 to 1997-06-30\nKPI Formulas: AOV\nCategories/Entities: Beverages\nSummary: Summer campaign"
        );
    }

    #[tokio::test]
    async fn test_generate_sql_strips_fences_and_carries_retry_context() {
        let predictor = ScriptedPredictor::new().push(
            &GENERATE_SQL,
            Prediction::from_pairs([("sql_query", "```sql\nSELECT COUNT(*) FROM orders\n```")]),
        );
        let run = state("How many orders?", "int").apply(
            StateUpdate::new()
                .constraints_summary(NO_CONSTRAINTS.to_string())
                .sql_query("SELECT YEAR(OrderDate) FROM orders".to_string())
                .sql_error(Some("no such function: YEAR".to_string()))
                .retry_count(1),
        );

        let update = generate_sql(&predictor, "schema", &run).await.unwrap();
        let run = run.apply(update);
        assert_eq!(run.sql_query, "SELECT COUNT(*) FROM orders");

        let (_, inputs) = &predictor.calls()[0];
        assert_eq!(
            inputs["constraints"],
            "No specific constraints extracted.\nPrevious error: no such function: YEAR\nPrevious query: SELECT YEAR(OrderDate) FROM orders"
        );
    }

    #[test]
    fn test_first_attempt_has_no_retry_context() {
        let run = state("q", "int").apply(StateUpdate::new().constraints_summary("c".to_string()));
        assert_eq!(sql_generation_context(&run), "c");
    }

    #[tokio::test]
    async fn test_execute_sql_success_and_failure() {
        let tool = fixture_tool().await;

        let run = state("q", "int").apply(StateUpdate::new().sql_query("SELECT COUNT(*) AS n FROM orders".to_string()));
        let update = execute_sql(&tool, &run).await;
        let run = run.apply(update);
        assert!(run.sql_error.is_none());
        assert_eq!(run.tables_used, vec!["Orders"]);
        assert_eq!(run.sql_result.as_ref().unwrap()[0]["n"], json!(5));

        let run = run.apply(StateUpdate::new().sql_query("SELECT * FROM nope".to_string()));
        let update = execute_sql(&tool, &run).await;
        let run = run.apply(update);
        assert!(run.sql_error.is_some());
        assert!(run.sql_result.is_none());
        assert!(run.tables_used.is_empty());
    }

    #[test]
    fn test_validate_checks_previous_answer_only() {
        let run = state("q", "int");
        assert!(run.clone().apply(validate(&run)).validation_error.is_none());

        let run = run.apply(StateUpdate::new().final_output(FinalOutput {
            final_answer: "forty-two".to_string(),
            ..FinalOutput::error("q1", "x")
        }));
        assert!(run.clone().apply(validate(&run)).validation_error.is_some());
    }

    #[test]
    fn test_render_sql_result_caps_rows() {
        assert_eq!(render_sql_result(None), "[]");

        let rows: Vec<Map<String, Value>> = (0..60)
            .map(|i| {
                let mut row = Map::new();
                row.insert("n".to_string(), json!(i));
                row
            })
            .collect();
        let rendered = render_sql_result(Some(&rows));
        assert!(rendered.ends_with("(60 rows total, first 50 shown)"));
        assert!(rendered.contains("{\"n\":49}"));
        assert!(!rendered.contains("{\"n\":50}"));
    }

    #[tokio::test]
    async fn test_synthesize_merges_citations_and_scores() {
        let predictor = ScriptedPredictor::new().push(
            &SYNTHESIZE,
            Prediction::from_pairs([("final_answer", "3"), ("explanation", "Counted orders.")])
                .with_value("citations", json!("Orders, kpi_definitions.md::chunk1")),
        );
        let run = state("How many orders were placed in 1997?", "int").apply(
            StateUpdate::new()
                .sql_query("SELECT COUNT(*) FROM orders".to_string())
                .tables_used(vec!["Orders".to_string()])
                .retry_count(1),
        );

        let update = synthesize(&predictor, &run).await.unwrap();
        let run = run.apply(update);
        let output = run.final_output.unwrap();
        assert_eq!(output.final_answer, "3");
        assert_eq!(output.sql, "SELECT COUNT(*) FROM orders");
        assert_eq!(output.citations, vec!["Orders", "kpi_definitions.md::chunk1"]);
        assert_eq!(output.confidence, 0.8);
        assert_eq!(run.confidence, 0.8);
    }
}
