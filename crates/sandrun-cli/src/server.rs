//! HTTP service exposing the runner

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sandrun::{ExecuteError, ExecutionRequest, LanguageSummary, Runner};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Seconds a client should wait before retrying a rejected request
const RETRY_AFTER_SECS: &str = "1";

#[derive(Debug, Serialize)]
struct LanguagesResponse {
    languages: Vec<LanguageSummary>,
}

#[derive(Debug, Serialize)]
struct TemplateResponse {
    language: String,
    template: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

fn rejection(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
        .into_response()
}

pub fn router(runner: Runner) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/languages", get(languages))
        .route("/template/:language", get(template))
        .route("/health", get(health))
        .with_state(runner)
}

/// Bind and serve until the process is stopped
pub async fn serve(runner: Runner, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router(runner))
        .await
        .context("server error")
}

/// POST /execute
async fn execute(State(runner): State<Runner>, Json(request): Json<ExecutionRequest>) -> Response {
    match runner.execute(request).await {
        Ok(result) => Json(result).into_response(),
        Err(ExecuteError::Validation(e)) => rejection(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e @ ExecuteError::Busy) => {
            warn!("rejecting request, all execution slots busy");
            let mut response = rejection(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
            response.headers_mut().insert(
                header::RETRY_AFTER,
                header::HeaderValue::from_static(RETRY_AFTER_SECS),
            );
            response
        }
    }
}

/// GET /languages
async fn languages(State(runner): State<Runner>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: runner.languages(),
    })
}

/// GET /template/{language}
async fn template(State(runner): State<Runner>, Path(language): Path<String>) -> Response {
    match runner.template(&language) {
        Ok(template) => Json(TemplateResponse { language, template }).into_response(),
        Err(e) => rejection(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// GET /health
async fn health(State(runner): State<Runner>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "available_slots": runner.available_slots(),
    }))
}
