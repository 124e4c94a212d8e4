//! Backend route handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::backend::artifact::{Artifact, CompilationData, Failure};
use crate::backend::compiler::{CompileInput, Compiler, CompilerError};
use crate::backend::store::{CompilationRecord, CompilationStatus, ResultStore};
use crate::observability::metrics;

const NOT_FOUND: &str = "NOT FOUND";

/// Shared state for backend handlers.
#[derive(Clone)]
pub struct BackendState {
    pub compiler: Arc<dyn Compiler>,
    pub store: ResultStore,
    pub permits: Arc<Semaphore>,
    pub version: Arc<str>,
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Check a compile request body and pick the source to compile.
///
/// Only the first entry of `sources`, in document order, is used.
pub fn validate_request(body: &Value) -> Result<CompileInput, Failure> {
    let sources = body
        .get("sources")
        .ok_or_else(|| Failure::new("Missing sources key"))?;
    let sources = sources
        .as_object()
        .ok_or_else(|| Failure::new("Sources must be an object"))?;
    let (source_id, entry) = sources
        .iter()
        .next()
        .ok_or_else(|| Failure::new("No sources provided"))?;

    let content = entry.get("content").unwrap_or(&Value::Null);
    if is_blank(content) {
        return Err(Failure::new("No code provided in sources"));
    }
    let content = content
        .as_str()
        .ok_or_else(|| Failure::new("Code must be a non-empty string"))?;

    Ok(CompileInput {
        source_id: source_id.clone(),
        content: content.to_string(),
    })
}

impl BackendState {
    /// Run the compiler on a validated input.
    async fn compile(&self, input: CompileInput) -> (StatusCode, CompilationData) {
        let start = Instant::now();

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!("Compiler permits closed");
                return internal_error();
            }
        };

        match self.compiler.compile(input.clone()).await {
            Ok(output) => {
                metrics::record_compilation("success", start);
                tracing::info!(source = %input.source_id, "Compilation succeeded");
                (
                    StatusCode::OK,
                    CompilationData::Artifact(Box::new(Artifact::build(&input, output))),
                )
            }
            Err(CompilerError::Diagnostic {
                message,
                line,
                column,
            }) => {
                metrics::record_compilation("failure", start);
                tracing::info!(source = %input.source_id, error = %message, "Compilation failed");
                (
                    StatusCode::BAD_REQUEST,
                    CompilationData::Failure(Failure::diagnostic(message, line, column)),
                )
            }
            Err(e) => {
                metrics::record_compilation("error", start);
                tracing::error!(source = %input.source_id, error = %e, "Compiler error");
                internal_error()
            }
        }
    }
}

fn internal_error() -> (StatusCode, CompilationData) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        CompilationData::Failure(Failure::new("Internal compilation error")),
    )
}

/// `GET /`
pub async fn index(State(state): State<BackendState>) -> String {
    format!("Vyper Compiler. Version: {} \n", state.version)
}

/// `POST /compile`: store the outcome and answer with its id.
pub async fn compile(State(state): State<BackendState>, body: Bytes) -> Response {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected non-JSON compile request");
            return (
                StatusCode::BAD_REQUEST,
                Json(Failure::new("Invalid JSON body")),
            )
                .into_response();
        }
    };

    let (status, data) = match validate_request(&request) {
        Ok(input) => state.compile(input).await,
        Err(failure) => {
            tracing::debug!(reason = %failure.message, "Rejected compile request");
            (StatusCode::BAD_REQUEST, CompilationData::Failure(failure))
        }
    };

    let record_status = if status == StatusCode::OK {
        CompilationStatus::Success
    } else {
        CompilationStatus::Failure
    };
    let id = state.store.insert(CompilationRecord {
        status: record_status,
        data,
    });
    tracing::debug!(id = %id, status = record_status.as_str(), "Stored compilation");

    (status, Json(id)).into_response()
}

/// `GET /status/{id}`
pub async fn status(State(state): State<BackendState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id) {
        Some(record) => record.status.as_str().into_response(),
        None => (StatusCode::NOT_FOUND, NOT_FOUND).into_response(),
    }
}

/// `GET /artifacts/{id}`
pub async fn artifacts(State(state): State<BackendState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id) {
        Some(record) => Json(record.data).into_response(),
        None => (StatusCode::NOT_FOUND, NOT_FOUND).into_response(),
    }
}
