//! REST API server for the stock query engine
//!
//! Exposes the pipeline over HTTP for frontend consumption. Failures carry
//! the pipeline stage tag so clients can tell a bad query from an upstream
//! outage.

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{ErrorStage, QueryError};
use crate::models::QueryOptions;
use crate::pipeline::QueryPipeline;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub skip_cache: bool,
}

#[derive(Debug, Deserialize)]
pub struct BatchQueryRequest {
    pub queries: Vec<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<ErrorStage>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            stage: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn failure(error: &QueryError) -> Self {
        // Field suggestions ride along so clients can show corrections.
        let data = match error {
            QueryError::InvalidFields {
                invalid_fields,
                suggestions,
            } => serde_json::to_value(serde_json::json!({
                "invalid_fields": invalid_fields,
                "suggestions": suggestions,
            }))
            .ok(),
            _ => None,
        };

        Self {
            success: false,
            data,
            error: Some(error.to_string()),
            stage: Some(error.stage()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn status_for(stage: ErrorStage) -> StatusCode {
    match stage {
        ErrorStage::Validation => StatusCode::BAD_REQUEST,
        ErrorStage::Preprocessing | ErrorStage::DataFetching => StatusCode::BAD_GATEWAY,
        ErrorStage::Transfer => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<QueryPipeline>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "stock-query-engine",
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Query Endpoints
/// =============================

async fn run_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received query: {}", req.query);

    let options = QueryOptions {
        skip_cache: req.skip_cache,
    };

    match state.pipeline.run(&req.query, options).await {
        Ok(result) => (StatusCode::OK, Json(ApiResponse::success(result))),
        Err(e) => (status_for(e.stage()), Json(ApiResponse::failure(&e))),
    }
}

async fn run_batch(
    State(state): State<ApiState>,
    Json(req): Json<BatchQueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received batch of {} queries", req.queries.len());

    // Queries run in sequence; per-query failures are reported in place so
    // one bad query does not sink the batch.
    let mut outcomes: Vec<ApiResponse> = Vec::with_capacity(req.queries.len());
    for query in &req.queries {
        let outcome = match state.pipeline.run(query, QueryOptions::default()).await {
            Ok(result) => ApiResponse::success(result),
            Err(e) => ApiResponse::failure(&e),
        };
        outcomes.push(outcome);
    }

    (StatusCode::OK, Json(ApiResponse::success(outcomes)))
}

/// =============================
/// Router
/// =============================

pub fn create_router(pipeline: Arc<QueryPipeline>) -> Router {
    let state = ApiState { pipeline };

    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(run_query))
        .route("/api/query/batch", post(run_batch))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    pipeline: Arc<QueryPipeline>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(pipeline);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_response_carries_stage() {
        let err = QueryError::InvalidQuery("too short".into());
        let response = ApiResponse::failure(&err);

        assert!(!response.success);
        assert_eq!(response.stage, Some(ErrorStage::Validation));
        assert_eq!(status_for(ErrorStage::Validation), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_fields_response_includes_suggestions() {
        let err = QueryError::InvalidFields {
            invalid_fields: vec!["pe_ration".into()],
            suggestions: vec![crate::models::FieldSuggestion {
                invalid: "pe_ration".into(),
                suggestions: vec!["pe_ratio".into()],
            }],
        };
        let response = ApiResponse::failure(&err);

        let data = response.data.expect("suggestion payload");
        assert_eq!(data["invalid_fields"][0], "pe_ration");
        assert_eq!(data["suggestions"][0]["suggestions"][0], "pe_ratio");
    }

    #[test]
    fn test_upstream_stages_map_to_bad_gateway() {
        assert_eq!(status_for(ErrorStage::Preprocessing), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorStage::DataFetching), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(ErrorStage::Transfer),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
