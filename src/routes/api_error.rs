//! Error type shared by all route handlers.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::{AdherenceError, ScheduleError, StoreError};

// ---

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Range(#[from] AdherenceError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Range(_) | ApiError::Schedule(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::BAD_GATEWAY,
            ApiError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
