//! HTTP request handlers

use super::types::ErrorResponse;
use super::AppState;
use crate::engine::{EngineError, ErrorKind};
use crate::store::ContextRecord;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Message intake
        .route("/", post(apply_message))
        // Context inspection
        .route("/api/contexts/:rule/:id", get(get_context))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Message Handlers
// ============================================================

async fn apply_message(
    State(state): State<AppState>,
    Json(message): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("apply_message", %request_id);

    let response = state.engine.apply_message(message).instrument(span).await?;
    Ok(Json(response))
}

async fn get_context(
    State(state): State<AppState>,
    Path((rule, id)): Path<(String, String)>,
) -> Result<Json<ContextRecord>, AppError> {
    let context = state
        .store
        .get(&rule, &id)
        .ok_or_else(|| AppError::NotFound(format!("No context #{id} for rule {rule}")))?;
    Ok(Json(ContextRecord::new(&context, &id)))
}

async fn get_version() -> &'static str {
    concat!("conveyor ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    Engine(EngineError),
    NotFound(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RuleNotFound => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::DuplicateContext => StatusCode::CONFLICT,
        ErrorKind::IdAllocationExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::StepInvocationFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::StepTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::HopLimitExceeded => StatusCode::LOOP_DETECTED,
        ErrorKind::UntrackedContext | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Engine(err) => {
                let status = status_for(err.kind());
                if status.is_server_error() {
                    tracing::error!(error = %err, kind = err.kind().as_str(), "Message failed");
                }
                (status, Json(err.to_document())).into_response()
            }
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("not_found", message)),
            )
                .into_response(),
        }
    }
}
