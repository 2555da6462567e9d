use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api::models::upload::ErrorEnvelope;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The multipart request did not carry a usable file under the expected field
    #[error("{message}")]
    InvalidFileField { message: String },

    /// The uploaded file is larger than the configured ceiling
    #[error("File size exceeds maximum allowed size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Reading the request body or talking to the image host failed
    #[error("{message}: {source:#}")]
    DownstreamFailure {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub fn downstream(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::DownstreamFailure {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidFileField { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::DownstreamFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidFileField { message } => message.clone(),
            Error::PayloadTooLarge { limit } => format!(
                "File size exceeds maximum allowed size of {} bytes ({} MB)",
                limit,
                limit / (1024 * 1024)
            ),
            Error::DownstreamFailure { message, .. } => message.clone(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::DownstreamFailure { .. } => {
                tracing::error!("Upload relay error: {:#}", self);
            }
            Error::PayloadTooLarge { .. } => {
                tracing::warn!("Rejected upload: {}", self);
            }
            Error::InvalidFileField { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorEnvelope {
            error: self.user_message(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
