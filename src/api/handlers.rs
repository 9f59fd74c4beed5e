//! Axum request handlers for the HTTP API.
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::api::routes::AppState;
use crate::error::AppError;
use crate::job::{JobFailure, JobResult};

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, err: AppError) -> ApiError {
    (status, Json(json!({ "error": err.to_string() })))
}

pub async fn root() -> &'static str {
    "ComfyUI job adapter"
}

pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    if state.job_handler.engine_healthy().await {
        (StatusCode::OK, Json(json!({ "status": "ok", "engine": true })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "degraded", "engine": false })))
    }
}

/// Run one job. Always answers 200 with a `JobResult`; a body that is not JSON
/// is reported the same way as any other job failure.
pub async fn run_job(State(state): State<Arc<AppState>>, body: Bytes) -> Json<JobResult> {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Job body is not JSON: {}", e);
            return Json(JobResult::Failure(JobFailure {
                error: format!("job body is not valid JSON: {}", e),
                status_code: None,
                details: None,
                raw_output: None,
            }));
        }
    };
    Json(state.job_handler.handle(&raw).await)
}

/// Resolve a workflow with params and return the graph that would be submitted.
pub async fn render(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let workflow_name = payload
        .get("workflow_name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, AppError::Validation(vec!["'workflow_name' is required".into()])))?;
    let params = match payload.get("params") {
        Some(Value::Object(map)) => map.clone(),
        None => Map::new(),
        Some(_) => {
            return Err(api_error(StatusCode::BAD_REQUEST, AppError::Validation(vec!["'params' must be an object".into()])));
        }
    };
    let id = payload.get("id").and_then(|v| v.as_str()).unwrap_or("render");

    match state.job_handler.resolve(id, workflow_name, &params).await {
        Ok(resolved) => Ok(Json(json!({
            "prompt": resolved.graph,
            "filename_prefix": resolved.filename_prefix,
        }))),
        Err(e @ AppError::TemplateNotFound(_)) => Err(api_error(StatusCode::NOT_FOUND, e)),
        Err(e @ AppError::Validation(_)) => Err(api_error(StatusCode::BAD_REQUEST, e)),
        Err(e) => {
            tracing::error!("Failed to render workflow: {}", e);
            Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, e))
        }
    }
}

pub async fn list_workflows(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state
        .job_handler
        .store()
        .list()
        .await
        .map(|names| Json(json!({ "workflows": names })))
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))
}
