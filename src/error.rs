use std::time::Duration;

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::models::PublishResult;

/// Process-level errors raised while starting up or talking to Iggy outside
/// of a publish call.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to connect to Iggy server: {0}")]
    ConnectionFailed(String),

    #[error("Stream operation failed: {0}")]
    StreamError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics exporter error: {0}")]
    MetricsError(String),
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

/// Credential check failures. Both map to 401.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authorization header")]
    Missing,

    #[error("Invalid API key")]
    Invalid,
}

/// The value could not be turned into broker bytes.
#[derive(Error, Debug)]
#[error("value is not representable: {0}")]
pub struct EncodingError(#[from] pub serde_json::Error);

/// Failures reported by a [`BrokerTransport`](crate::services::BrokerTransport).
///
/// Transient variants are retried by the publisher; permanent ones fail the
/// call on the first attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("topic provisioning failed: {0}")]
    Provisioning(String),

    #[error("append failed: {0}")]
    Append(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("transport is closed")]
    Closed,
}

impl BrokerError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::Unavailable(_) | BrokerError::Provisioning(_) | BrokerError::Append(_)
        )
    }
}

/// Terminal outcome of a failed [`Publisher::publish`](crate::services::Publisher::publish).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("write not completed within {0:?}")]
    WriteTimeout(Duration),

    #[error("acknowledgment not received within {0:?}")]
    AckTimeout(Duration),

    #[error("publish failed after {attempts} attempt(s): {source}")]
    Broker {
        attempts: u32,
        #[source]
        source: BrokerError,
    },

    #[error("publish task aborted: {0}")]
    Aborted(String),
}

impl PublishError {
    /// Label value used for the broker-error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::WriteTimeout(_) => "write_timeout",
            PublishError::AckTimeout(_) => "ack_timeout",
            PublishError::Broker {
                source: BrokerError::InvalidRecord(_),
                ..
            } => "invalid_record",
            PublishError::Broker {
                source: BrokerError::Closed,
                ..
            } => "closed",
            PublishError::Broker { .. } | PublishError::Aborted(_) => "send_error",
        }
    }
}

/// Every way a `POST /message` request can be rejected.
///
/// Each variant is converted into its terminal HTTP response here; nothing
/// propagates past the publish handler.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl PipelineError {
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Auth(_) => StatusCode::UNAUTHORIZED,
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::Encoding(_) | PipelineError::Publish(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Build a validation error from a body parse failure.
    pub fn malformed_body(e: &serde_json::Error) -> Self {
        PipelineError::Validation(format!(
            "Invalid request format: {}",
            sanitize_serde_error(e)
        ))
    }
}

/// 401 body. Carries only `error`, unlike [`PublishResult`].
#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self {
            PipelineError::Auth(e) => (
                status,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(AuthErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response(),
            PipelineError::Validation(msg) => {
                (status, Json(PublishResult::failure(msg))).into_response()
            }
            PipelineError::BodyTooLarge(_) => (
                status,
                Json(PublishResult::failure("Request body too large")),
            )
                .into_response(),
            // Server-side failures keep their details in the logs only
            PipelineError::Encoding(_) => (
                status,
                Json(PublishResult::failure("Failed to encode message value")),
            )
                .into_response(),
            PipelineError::Publish(_) => (
                status,
                Json(PublishResult::failure("Failed to publish message to broker")),
            )
                .into_response(),
        }
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
fn sanitize_serde_error(e: &serde_json::Error) -> String {
    let msg = e.to_string();

    if msg.contains("missing field")
        && let Some(start) = msg.find('`')
        && let Some(end) = msg[start + 1..].find('`')
    {
        let field = &msg[start + 1..start + 1 + end];
        return format!("missing required field: {field}");
    }

    if msg.contains("invalid type") {
        return "invalid data type in request body".to_string();
    }

    if e.is_eof() || e.is_syntax() {
        return "malformed JSON in request body".to_string();
    }

    "invalid request body".to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[allow(dead_code)]
    struct Probe {
        topic: String,
        count: u32,
    }

    fn parse_err(json: &str) -> serde_json::Error {
        serde_json::from_str::<Probe>(json).unwrap_err()
    }

    #[test]
    fn test_sanitize_missing_field() {
        let msg = sanitize_serde_error(&parse_err(r#"{"topic":"a"}"#));
        assert_eq!(msg, "missing required field: count");
    }

    #[test]
    fn test_sanitize_invalid_type_hides_type_names() {
        let msg = sanitize_serde_error(&parse_err(r#"{"topic":"a","count":"x"}"#));
        assert_eq!(msg, "invalid data type in request body");
        assert!(!msg.contains("u32"));
    }

    #[test]
    fn test_sanitize_malformed_json() {
        let msg = sanitize_serde_error(&parse_err(r#"{"topic":"#));
        assert_eq!(msg, "malformed JSON in request body");
    }

    #[test]
    fn test_pipeline_error_status_codes() {
        assert_eq!(
            PipelineError::from(AuthError::Missing).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            PipelineError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PipelineError::BodyTooLarge(64).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            PipelineError::from(PublishError::AckTimeout(Duration::from_secs(1))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_publish_error_kinds() {
        let send = PublishError::Broker {
            attempts: 3,
            source: BrokerError::Unavailable("down".into()),
        };
        assert_eq!(send.kind(), "send_error");

        let invalid = PublishError::Broker {
            attempts: 1,
            source: BrokerError::InvalidRecord("key too long".into()),
        };
        assert_eq!(invalid.kind(), "invalid_record");

        assert_eq!(
            PublishError::WriteTimeout(Duration::from_secs(10)).kind(),
            "write_timeout"
        );
        assert_eq!(
            PublishError::AckTimeout(Duration::from_secs(10)).kind(),
            "ack_timeout"
        );
    }

    #[test]
    fn test_broker_error_transience() {
        assert!(BrokerError::Unavailable("x".into()).is_transient());
        assert!(BrokerError::Append("x".into()).is_transient());
        assert!(BrokerError::Provisioning("x".into()).is_transient());
        assert!(!BrokerError::InvalidRecord("x".into()).is_transient());
        assert!(!BrokerError::Closed.is_transient());
    }
}
