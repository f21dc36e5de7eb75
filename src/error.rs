use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Failures surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("{0}")]
    InvalidMedia(&'static str),
    #[error("For base64 the file name must be informed.")]
    MissingDocumentFileName,
    #[error("Reaction must be a single emoji or empty string")]
    InvalidReaction,
    #[error("{0}")]
    BadBody(String),
    #[error("The \"{0}\" instance does not exist")]
    InstanceNotFound(String),
    #[error(transparent)]
    Instance(#[from] anyhow::Error),
}

pub const MEDIA_URL_OR_BASE64: &str = "Owned media must be a url or base64";
pub const AUDIO_URL_BASE64_OR_FILE: &str =
    "Owned media must be a url, base64, or valid file with buffer";

impl SendError {
    pub fn status(&self) -> StatusCode {
        match self {
            SendError::InvalidMedia(_)
            | SendError::MissingDocumentFileName
            | SendError::InvalidReaction
            | SendError::BadBody(_) => StatusCode::BAD_REQUEST,
            SendError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            SendError::Instance(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Instance call failed: {:#}", self);
        }
        (
            status,
            Json(json!({
                "status": status.as_u16(),
                "error": status.canonical_reason().unwrap_or("Error"),
                "response": { "message": [self.to_string()] },
            })),
        )
            .into_response()
    }
}
