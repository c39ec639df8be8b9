//! Error responses for the web layer

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::errors::AppError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Wraps [`AppError`] so handlers can return it with `?`
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Source(_) | AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration { .. } | AppError::Internal { .. } | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
