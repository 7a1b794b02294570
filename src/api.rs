//! REST API server for the financial report agent
//!
//! Exposes the compiled workflow over HTTP. The interactive front-end
//! stays external; it talks to these endpoints and renders the report.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::graph::Graph;
use crate::history::{input_digest, RunHistory, RunRecord};
use crate::state::AgentState;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalyzeRequest {
    pub task: String,
    pub competitors: Vec<String>,
    /// Raw CSV text of the company's financial data.
    pub source_document: String,
    pub max_revisions: Option<u32>,
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
    pub graph: Arc<Graph>,
    pub history: Arc<RunHistory>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Analysis Endpoint
/// =============================

async fn run_analysis(
    State(state): State<ApiState>,
    Json(req): Json<AnalyzeRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received analysis request: {}", req.task);

    if req.task.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Task must not be empty".into())),
        );
    }

    let competitors: Vec<String> = req
        .competitors
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    let max_revisions = req.max_revisions.unwrap_or(2).max(1);

    let initial = AgentState::new(
        req.task.clone(),
        competitors.clone(),
        req.source_document.clone(),
        max_revisions,
    );

    let start = Instant::now();
    let mut folded = initial.clone();
    let mut step_trace = Vec::new();

    let mut rx = state.graph.stream(initial);
    while let Some(update) = rx.recv().await {
        match update {
            Ok(update) => {
                folded.apply(&update.delta);
                step_trace.push(update.step);
            }
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(format!("Analysis failed: {}", e))),
                );
            }
        }
    }

    let execution_time_ms = start.elapsed().as_millis() as u64;
    let record = RunRecord {
        run_id: uuid::Uuid::new_v4(),
        task: req.task.clone(),
        competitors,
        max_revisions,
        input_digest: input_digest(&req.task, &req.source_document),
        report: folded.report.clone(),
        step_trace: step_trace.clone(),
        created_at: chrono::Utc::now(),
        execution_time_ms,
    };

    let run_id = match state.history.record(record).await {
        Ok(id) => id,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Failed to record run: {}", e))),
            );
        }
    };

    info!(%run_id, steps = step_trace.len(), execution_time_ms, "Analysis complete");

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "run_id": run_id,
            "report": folded.report,
            "comparison": folded.comparison,
            "revisions": folded.revision_number.saturating_sub(1),
            "step_trace": step_trace,
            "execution_time_ms": execution_time_ms,
        }))),
    )
}

/// =============================
/// History Endpoints
/// =============================

async fn list_runs(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.history.list().await))
}

async fn get_run(
    State(state): State<ApiState>,
    Path(run_id): Path<uuid::Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.history.get(run_id).await {
        Some(record) => (StatusCode::OK, Json(ApiResponse::success(record))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("No run with id {}", run_id))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(graph: Arc<Graph>, history: Arc<RunHistory>) -> Router {
    let state = ApiState { graph, history };

    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(run_analysis))
        .route("/api/runs", get(list_runs))
        .route("/api/runs/:run_id", get(get_run))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    graph: Arc<Graph>,
    history: Arc<RunHistory>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(graph, history);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
