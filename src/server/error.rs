//! Error-to-HTTP response conversion.
//!
//! Lets handlers return `Result<T, AppError>` and have [`crate::Error`]
//! rendered as a JSON body with a matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for the crate error.
pub struct AppError {
    inner: crate::Error,
}

impl AppError {
    pub fn new(inner: crate::Error) -> Self {
        Self { inner }
    }
}

impl From<crate::Error> for AppError {
    fn from(e: crate::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Failed to serve request"
            );
        }

        let code = match &self.inner {
            crate::Error::Media(_) => "malformed_media",
            crate::Error::PartUnavailable { .. } => "part_unavailable",
            crate::Error::FragmentNotFound { .. } => "fragment_not_found",
            crate::Error::PartCeilingExceeded { .. } => "part_ceiling_exceeded",
            crate::Error::OriginStatus { .. } => "origin_error",
            crate::Error::Http(_) => "origin_unreachable",
            crate::Error::BadRequest(_) => "bad_request",
            crate::Error::Proxy(_) => "proxy_error",
        };

        let body = json!({
            "error": self.inner.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
