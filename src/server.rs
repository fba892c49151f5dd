//! HTTP API consumed by the browser extension.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/generate-reply` | Draft a reply for `{ companyName, body }` |
//! | `POST` | `/api/ingest` | Store `{ companyName, emails }` as tone examples |
//! | `GET`  | `/health` | Health check |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "bad_request", "details": "companyName and body are required" }
//! ```
//!
//! Error codes: `bad_request` (400), `embedding_failed`, `store_unavailable`,
//! `dimension_mismatch`, `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the extension's
//! background worker calls this API cross-origin.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ReplyError;
use crate::models::{Query, ReplyResult};
use crate::pipeline::ReplyPipeline;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<ReplyPipeline>,
}

/// Starts the HTTP server.
///
/// Builds the pipeline from `config` (failing fast on missing credentials),
/// binds to `[server].bind`, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(ReplyPipeline::from_config(config).await?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "reply API listening");
    println!("Reply API listening on http://{}", listener.local_addr()?);
    serve(listener, pipeline).await
}

/// Serve `pipeline` on an already-bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    pipeline: Arc<ReplyPipeline>,
) -> anyhow::Result<()> {
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

/// Build the router with all routes and the CORS layer.
pub fn router(pipeline: Arc<ReplyPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/generate-reply", post(handle_generate_reply))
        .route("/api/ingest", post(handle_ingest))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { pipeline })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code.to_string(),
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(details: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        details: Some(details.into()),
    }
}

impl From<ReplyError> for AppError {
    fn from(err: ReplyError) -> Self {
        let code = match &err {
            ReplyError::Input(_) => return bad_request(err.to_string()),
            ReplyError::Provider { .. } => "embedding_failed",
            ReplyError::BackendUnavailable { .. } => "store_unavailable",
            ReplyError::DimensionMismatch { .. } => "dimension_mismatch",
            ReplyError::Config(_) => "internal",
        };
        warn!(code, error = %err, "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            details: Some(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "Reply assistant API ready",
    })
}

// ============ POST /api/generate-reply ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReplyRequest {
    company_name: Option<String>,
    body: Option<String>,
}

async fn handle_generate_reply(
    State(state): State<AppState>,
    payload: Result<Json<GenerateReplyRequest>, JsonRejection>,
) -> Result<Json<ReplyResult>, AppError> {
    let Json(req) = payload?;
    let (Some(company_name), Some(body)) = (required(req.company_name), required(req.body)) else {
        return Err(bad_request("companyName and body are required"));
    };

    let result = state
        .pipeline
        .generate_reply(&Query {
            incoming_text: body,
            company_name,
        })
        .await?;
    Ok(Json(result))
}

// ============ POST /api/ingest ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestRequest {
    company_name: Option<String>,
    emails: Option<Vec<String>>,
}

#[derive(Serialize)]
struct IngestResponse {
    ok: bool,
    inserted: usize,
}

async fn handle_ingest(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(req) = payload?;
    let (Some(company_name), Some(emails)) = (required(req.company_name), req.emails) else {
        return Err(bad_request("companyName and emails are required"));
    };
    if emails.iter().any(|e| e.trim().is_empty()) {
        return Err(bad_request("emails must not contain empty texts"));
    }

    let inserted = state.pipeline.ingest(&company_name, &emails).await?;
    Ok(Json(IngestResponse { ok: true, inserted }))
}
