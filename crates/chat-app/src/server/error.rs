use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use forfore_llm::ModelLoadError;
use forfore_storage::StorageError;
use serde::Serialize;

use crate::error::ChatError;

/// JSON error body: `{"error": "..."}` with a status chosen per failure kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        let status = status_for(&error);
        if status.is_server_error() {
            tracing::error!(error = %error, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %error, status = status.as_u16(), "request rejected");
        }
        Self::new(status, error.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self::new(error.status(), error.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: &self.message,
            }),
        )
            .into_response()
    }
}

pub fn status_for(error: &ChatError) -> StatusCode {
    match error {
        ChatError::InvalidSettings { .. } | ChatError::InvalidRequest { .. } => {
            StatusCode::BAD_REQUEST
        }
        ChatError::UnsupportedImage { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ChatError::SessionBusy { .. } => StatusCode::CONFLICT,
        ChatError::ModelLoad { source, .. } => match source {
            ModelLoadError::EmptyIdentifier { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        },
        ChatError::Storage { source, .. } => match source {
            StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
            StorageError::InvalidId { .. } => StatusCode::BAD_REQUEST,
            StorageError::LockPoisoned { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ChatError::UnknownJob { .. } => StatusCode::NOT_FOUND,
        ChatError::InvalidTransition { .. }
        | ChatError::WorkerStopped { .. }
        | ChatError::StatePoisoned { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
