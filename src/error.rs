use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::OnceLock;
use thiserror::Error;

static EXPOSE_DETAIL: OnceLock<bool> = OnceLock::new();

/// Fixes whether server-side error text is included in responses. Only the
/// first call takes effect; until then detail is exposed.
pub fn set_expose_detail(expose: bool) {
    let _ = EXPOSE_DETAIL.set(expose);
}

fn expose_detail() -> bool {
    EXPOSE_DETAIL.get().copied().unwrap_or(true)
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidFilter(_) => "InvalidFilter",
            AppError::ValidationFailed(_) => "ValidationFailed",
            AppError::NotFound(_) => "NotFound",
            AppError::Forbidden(_) => "Forbidden",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Database(_) | AppError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidFilter(_) | AppError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::ValidationFailed(errors.to_string())
    }
}

impl AppError {
    /// JSON error body; `detail` carries the underlying server-side error
    /// text and is only present when `expose_detail` is set.
    pub fn body(&self, expose_detail: bool) -> serde_json::Value {
        let (message, detail) = match self {
            AppError::InvalidFilter(msg)
            | AppError::ValidationFailed(msg)
            | AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::Unauthorized(msg) => (msg.clone(), None),
            AppError::Database(e) => ("Database error".to_string(), Some(e.to_string())),
            AppError::Internal(msg) => ("Internal server error".to_string(), Some(msg.clone())),
        };

        let mut body = json!({
            "kind": self.kind(),
            "message": message,
        });
        if let Some(detail) = detail.filter(|_| expose_detail) {
            body["detail"] = json!(detail);
        }
        body
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(e) => tracing::error!("Database error: {}", e),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            _ => {}
        }

        (self.status(), Json(self.body(expose_detail()))).into_response()
    }
}
