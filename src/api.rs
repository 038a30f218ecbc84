//! REST API Server for the retail analytics copilot
//!
//! Exposes the orchestrator via HTTP endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;
use crate::models::QuestionInput;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AskRequest {
    pub id: Option<String>,
    pub question: String,
    #[serde(default)]
    pub format_hint: Option<String>,
}

impl AskRequest {
    fn into_input(self) -> QuestionInput {
        QuestionInput {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            question: self.question,
            format_hint: self.format_hint.unwrap_or_default(),
        }
    }
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let index = state.orchestrator.index();

    Json(serde_json::json!({
        "status": "healthy",
        "chunks": index.chunks().len(),
        "corpus_fingerprint": index.fingerprint(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Question Endpoint
/// =============================

async fn ask(
    State(state): State<ApiState>,
    Json(req): Json<AskRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(
                OrchestrationError::InvalidInput("question must not be empty".into()).to_string(),
            )),
        );
    }

    let input = req.into_input();
    info!(id = %input.id, "Received question: {}", input.question);

    let report = state.orchestrator.run(&input).await;

    // Engine failures still carry a well-formed output record
    let mut response = ApiResponse::success(serde_json::json!({
        "output": report.output,
        "trace": report.trace,
    }));
    if let Some(error) = report.error {
        response.success = false;
        response.error = Some(error);
    }

    (StatusCode::OK, Json(response))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/ask", post(ask))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
