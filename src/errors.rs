use crate::services::object_store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for the HTTP surface.
///
/// Bookkeeping failures (counter/history writes) never appear here; they
/// are logged at the point of failure and swallowed, because file
/// transfer outranks bookkeeping.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("No file part")]
    MissingFilePart,

    #[error("No selected file")]
    EmptyFilename,

    #[error("malformed multipart body: {0}")]
    InvalidMultipart(String),

    #[error("File not found")]
    NotFound,

    #[error("could not assign a unique key for `{name}`")]
    KeyNamespaceExhausted { name: String },

    #[error("{0}")]
    Upstream(String),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingFilePart | Self::EmptyFilename | Self::InvalidMultipart(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::KeyNamespaceExhausted { .. } | Self::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Prefix upstream failures with operation context for the response
    /// body; other variants already carry their final message.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            Self::Upstream(msg) => Self::Upstream(format!("{context}: {msg}")),
            other => other,
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound,
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
