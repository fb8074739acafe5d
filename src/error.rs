//! Error taxonomy of the gateway and its mapping to HTTP responses.
//!
//! Every handler returns `Result<_, GatewayError>`; the conversion to a status
//! code and a `{"detail": "..."}` body happens once, in [`IntoResponse`].
//! Degraded mode is deliberately absent here: a missing backend is answered
//! with silent audio, not with an error.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Generic client-facing message used when internal detail is withheld.
pub const SYNTHESIS_FAILED_MESSAGE: &str = "speech synthesis failed";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing, empty or malformed request fields.
    #[error("{0}")]
    InvalidInput(String),

    /// The requested language has no speaker in the loaded model.
    #[error("invalid language or speaker: '{0}'")]
    InvalidLanguage(String),

    #[error("model '{0}' not found")]
    ModelNotFound(String),

    /// The backend failed, panicked, or produced no usable audio.
    #[error("{0}")]
    SynthesisFailed(String),

    /// The synthesis queue is full.
    #[error("synthesis queue is full, retry later")]
    Busy,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::InvalidLanguage(_) => StatusCode::BAD_REQUEST,
            Self::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Self::SynthesisFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Busy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, "{}", self);
        } else {
            tracing::debug!(%status, "{}", self);
        }
        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}
