use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::types::Channel;

/// Failure of a single outbound delivery attempt.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} responded with HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("No credential configured for {0}")]
    MissingCredential(&'static str),
}

/// Error taxonomy of the notification engine.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid message type: no dispatcher for channel {channel} with provider {provider:?}")]
    InvalidMessageType {
        channel: Channel,
        provider: Option<String>,
    },

    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Invalid key: push to {0:?} affected no elements")]
    InvalidKey(String),

    #[error("Queue {0:?} is empty")]
    EmptyQueue(String),

    #[error("Corrupt entry in queue {key:?}: {source}")]
    CorruptEntry {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NotifyError {
    /// HTTP status used when the error crosses the API boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            NotifyError::InvalidMessageType { .. } => StatusCode::BAD_REQUEST,
            NotifyError::EmptyQueue(_) => StatusCode::NOT_FOUND,
            NotifyError::Store(_) | NotifyError::InvalidKey(_) => StatusCode::SERVICE_UNAVAILABLE,
            NotifyError::CorruptEntry { .. } | NotifyError::Encode(_) | NotifyError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            NotifyError::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
