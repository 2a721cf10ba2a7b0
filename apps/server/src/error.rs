//! Maps internal failures onto HTTP responses. Account/auth middleware
//! and flow/secret CRUD validation are out of scope (spec.md §1); this
//! only covers what `flowrunner-manager` itself can report.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowrunner_core::UuidParseError;
use flowrunner_manager::ManagerError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Manager(#[from] ManagerError),

    #[error("invalid id: {0}")]
    InvalidId(#[from] UuidParseError),

    #[error("invalid flow descriptor: {0}")]
    BadDescriptor(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Manager(ManagerError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Manager(ManagerError::Validation(_) | ManagerError::Build(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidId(_) | Self::BadDescriptor(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
