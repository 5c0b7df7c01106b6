//!
//! Error handling for the Qri chat relay.
//!
//! Defines every failure the relay can hit while handling a request and maps each
//! one to a caller-safe message plus a machine-readable detail. Uses thiserror for
//! the Display and Error implementations.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Relay error types.
///
/// Every variant is surfaced to the caller exactly once, as assistant-shaped prose
/// with the raw cause in a `detail` field. None of them are fatal to the process.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    /// The inbound body could not be understood.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Upstream answered with a non-success status.
    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Upstream answered successfully but without completion content.
    #[error("Upstream returned no completion")]
    EmptyCompletion,

    /// Upstream could not be reached in time.
    #[error("Network error: {0}")]
    Network(String),
}

/* --- constants ------------------------------------------------------------------------------ */

/** role used for every relay-authored message */
pub const ASSISTANT_ROLE: &str = "assistant";

/** shown when the inbound body is malformed */
pub const BAD_REQUEST_MESSAGE: &str = "Bad request — I couldn't parse what was sent to me.";

/** shown when upstream rejects the request */
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Sorry—my backend couldn't complete the request.";

/** shown when upstream succeeds without content */
pub const EMPTY_COMPLETION_MESSAGE: &str =
    "I didn't receive a completion from the model. Try again.";

/** shown when upstream cannot be reached at all */
pub const NETWORK_FAILURE_MESSAGE: &str = "Sorry—I couldn't reach my backend.";

/* --- start of code -------------------------------------------------------------------------- */

impl RelayError {
    ///
    /// HTTP status used when this error ends a buffered request.
    ///
    /// An empty completion is deliberately a 200 so the caller's conversation keeps
    /// flowing.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Parse(_) => StatusCode::BAD_REQUEST,
            RelayError::EmptyCompletion => StatusCode::OK,
            RelayError::Network(_) => StatusCode::BAD_GATEWAY,
            RelayError::Upstream { .. } | RelayError::Config(_) | RelayError::Http(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    ///
    /// Caller-readable prose for this error.
    pub fn caller_message(&self) -> &'static str {
        match self {
            RelayError::Parse(_) => BAD_REQUEST_MESSAGE,
            RelayError::EmptyCompletion => EMPTY_COMPLETION_MESSAGE,
            RelayError::Network(_) => NETWORK_FAILURE_MESSAGE,
            RelayError::Upstream { .. } | RelayError::Config(_) | RelayError::Http(_) => {
                UPSTREAM_FAILURE_MESSAGE
            }
        }
    }

    ///
    /// Raw diagnostic text, if this error carries any.
    ///
    /// For upstream failures this is the upstream body verbatim.
    pub fn detail(&self) -> Option<String> {
        match self {
            RelayError::EmptyCompletion => None,
            RelayError::Upstream { body, .. } => Some(body.clone()),
            RelayError::Parse(msg)
            | RelayError::Network(msg)
            | RelayError::Config(msg)
            | RelayError::Http(msg) => Some(msg.clone()),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self.detail() {
            Some(detail) => json!({
                "role": ASSISTANT_ROLE,
                "content": self.caller_message(),
                "detail": detail,
            }),
            None => json!({
                "role": ASSISTANT_ROLE,
                "content": self.caller_message(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for cleaner error handling throughout the application
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_keeps_body_as_detail() {
        let err = RelayError::Upstream { status: 500, body: "rate limited".to_string() };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail().as_deref(), Some("rate limited"));
        assert_eq!(err.caller_message(), UPSTREAM_FAILURE_MESSAGE);
    }

    #[test]
    fn test_empty_completion_is_not_an_error_status() {
        let err = RelayError::EmptyCompletion;
        assert_eq!(err.status_code(), StatusCode::OK);
        assert!(err.detail().is_none());
    }

    #[test]
    fn test_parse_error_is_bad_request() {
        let err = RelayError::Parse("expected value at line 1 column 1".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.caller_message(), BAD_REQUEST_MESSAGE);
    }
}
