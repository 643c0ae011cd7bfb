use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("stop {0} not found on route")]
    StopNotFound(Uuid),

    #[error("concurrent modification: expected version {expected}, found {actual}")]
    ConcurrentModification { expected: u64, actual: u64 },

    #[error("capacity exceeded: {requested} stops requested, max capacity is {max_capacity}")]
    CapacityExceeded { requested: usize, max_capacity: u32 },

    #[error("stale update: {0}")]
    StaleUpdate(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Only optimistic-lock conflicts are worth retrying against fresh state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrentModification { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::StopNotFound(_) => "stop_not_found",
            AppError::ConcurrentModification { .. } => "concurrent_modification",
            AppError::CapacityExceeded { .. } => "capacity_exceeded",
            AppError::StaleUpdate(_) => "stale_update",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::StopNotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_)
            | AppError::InvalidTransition(_)
            | AppError::ConcurrentModification { .. }
            | AppError::StaleUpdate(_) => StatusCode::CONFLICT,
            AppError::CapacityExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
            "retryable": self.is_retryable(),
        }));

        (self.status(), body).into_response()
    }
}
