use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Classified outcome surfaced to callers of the token endpoint.
///
/// Exactly two kinds exist: the caller never proved identity, or the
/// backend mint failed. Backend failures are not sub-classified.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("User must be authenticated.")]
    Unauthenticated,
    #[error("{message}")]
    Internal { message: String },
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetails<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetails<'a> {
    code: &'a str,
    message: String,
}

impl ApiError {
    /// Short machine-readable code carried in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Internal { .. } => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut response = Json(ErrorBody {
            error: ErrorDetails {
                code: self.code(),
                message: self.to_string(),
            },
        })
        .into_response();
        *response.status_mut() = status;

        response
    }
}
