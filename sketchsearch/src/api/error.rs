//! HTTP rendering of library errors.

use crate::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
    status: u16,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::MissingFilter
            | Self::IndexNotFound(_)
            | Self::CrossSketchParent { .. }
            | Self::ParentNotFound(_)
            | Self::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Permission(_) => StatusCode::FORBIDDEN,
            Self::SketchNotFound(_) | Self::NodeNotFound(_) => StatusCode::NOT_FOUND,
            Self::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::CycleDetected(_)
            | Self::Backend(_)
            | Self::Storage(_)
            | Self::Json(_)
            | Self::Yaml(_)
            | Self::Http(_)
            | Self::Io(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "Request failed: {}", self);
        }
        let body = ErrorResponse {
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, axum::Json(body)).into_response()
    }
}
