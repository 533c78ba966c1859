use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("No text blocks detected on page")]
    NoBlocksDetected,

    #[error("Session state error: {0}")]
    SessionState(String),

    #[error("No session for document '{0}'")]
    DocumentNotFound(String),

    #[error("Bundle {bundle_index} for document '{document_id}' arrived after bundle {highest_seen}")]
    OutOfOrderBundle {
        document_id: String,
        bundle_index: u32,
        highest_seen: u32,
    },

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Raised by fragment producers passed to `Assembler::submit_with`
    #[allow(dead_code)]
    #[error("External service failed: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidImage(_) => "INVALID_IMAGE",
            PipelineError::NoBlocksDetected => "NO_BLOCKS_DETECTED",
            PipelineError::SessionState(_) => "SESSION_STATE",
            PipelineError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            PipelineError::OutOfOrderBundle { .. } => "OUT_OF_ORDER_BUNDLE",
            PipelineError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            PipelineError::MissingFile => "MISSING_FILE",
            PipelineError::InvalidRequest(_) => "INVALID_REQUEST",
            PipelineError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            PipelineError::NoBlocksDetected => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::SessionState(_) => StatusCode::CONFLICT,
            PipelineError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::OutOfOrderBundle { .. } => StatusCode::CONFLICT,
            PipelineError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::MissingFile => StatusCode::BAD_REQUEST,
            PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PipelineError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
