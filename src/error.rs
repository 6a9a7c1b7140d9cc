//! Error taxonomy.
//!
//! Startup errors are fatal and carry remediation text for the operator.
//! Webhook errors map onto the HTTP status the platform sees.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::startup::export_hints;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("config file '{path}' not found; check the path or pass --config <file>")]
    ConfigNotFound { path: String },

    #[error("config file '{path}' is malformed: {detail}")]
    ConfigParse { path: String, detail: String },

    #[error("config is missing required field(s): {}", .0.join(", "))]
    MissingConfigFields(Vec<String>),

    #[error("missing required environment variable(s): {}\n\nset them with:\n{}", .0.join(", "), export_hints(.0))]
    MissingEnvVars(Vec<String>),

    #[error("failed to build messaging API client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Per-request failures of the webhook endpoint.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("missing X-Line-Signature header")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("webhook body exceeds the configured limit")]
    BodyTooLarge,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("event dispatch failed: {0}")]
    Dispatch(String),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::InvalidSignature
            | WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            WebhookError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = status.canonical_reason().unwrap_or("Error");
        (status, body).into_response()
    }
}

/// Failure to deliver an echo through the reply API.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("reply request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("reply API returned {status}: {body}")]
    Api { status: u16, body: String },
}
