use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ledgerscan_core::{SessionError, StoreError};
use ledgerscan_export::ExportError;
use ledgerscan_extract::ExtractionError;
use serde_json::json;
use uuid::Uuid;

use crate::state::RegistryFull;

#[derive(Debug)]
pub enum ApiError {
    SessionNotFound(Uuid),
    TooManySessions { max: usize },
    Busy,
    NoSuchRow { index: usize, len: usize },
    EmptyImage,
    Extraction(ExtractionError),
    Export(ExportError),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound(_) | ApiError::NoSuchRow { .. } => StatusCode::NOT_FOUND,
            ApiError::TooManySessions { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Busy => StatusCode::CONFLICT,
            ApiError::EmptyImage => StatusCode::BAD_REQUEST,
            ApiError::Extraction(ExtractionError::MissingCredential { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Extraction(ExtractionError::Failed) => StatusCode::BAD_GATEWAY,
            ApiError::Export(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::SessionNotFound(id) => format!("Session not found: {id}"),
            ApiError::TooManySessions { max } => {
                format!("Too many open sessions (limit {max}); close one or retry later")
            }
            ApiError::Busy => "An extraction is already in progress for this session".to_string(),
            ApiError::NoSuchRow { index, len } => {
                format!("No transaction at position {index} (session holds {len})")
            }
            ApiError::EmptyImage => "Request body must contain an image".to_string(),
            ApiError::Extraction(e) => e.user_message().to_string(),
            ApiError::Export(_) | ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Export(e) => tracing::error!(error = %e, "export failed"),
            ApiError::Internal(detail) => tracing::error!(%detail, "internal error"),
            _ => {}
        }
        let body = Json(json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Busy => ApiError::Busy,
            SessionError::Store(StoreError::IndexOutOfRange { index, len }) => {
                ApiError::NoSuchRow { index, len }
            }
            SessionError::StaleTicket => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<RegistryFull> for ApiError {
    fn from(e: RegistryFull) -> Self {
        ApiError::TooManySessions { max: e.max }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(e: ExtractionError) -> Self {
        ApiError::Extraction(e)
    }
}

impl From<ExportError> for ApiError {
    fn from(e: ExportError) -> Self {
        ApiError::Export(e)
    }
}
