//! Message publishing handler.
//!
//! # Endpoints
//!
//! - `POST /message` - Publish one record to the topic named in the body
//!
//! # Request Flow
//!
//! ```text
//! authenticate ─▶ read body ─▶ parse body ─▶ check topic ─▶ encode ─▶ publish ─▶ 200
//!      │              │            │             │            │          │
//!     401            413          400           400          500        500
//! ```
//!
//! The body is read only after the caller is authenticated, and never past
//! `MAX_REQUEST_BODY_SIZE`. Whatever the exit, the request records one
//! duration, one response time and one auth attempt. Publish outcomes are
//! counted per topic.

use std::time::Instant;

use axum::Json;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{Span, debug, error, info, instrument, warn};

use crate::error::{PipelineError, PublishError};
use crate::metrics::{AUTH_FAILED, AUTH_SUCCESS, OUTCOME_ERROR, OUTCOME_SUCCESS};
use crate::models::{MessageValue, PublishRequest, PublishResult, Record};
use crate::services::{encode_headers, encode_key, encode_value};
use crate::state::AppState;
use crate::validation::validate_topic;

/// Path label used for this endpoint's metrics.
pub const PUBLISH_ENDPOINT: &str = "/message";

const PUBLISH_METHOD: &str = "POST";

/// Publish a message.
///
/// # Request Body
///
/// ```json
/// {
///   "topic": "orders.created",
///   "key": "customer-7",
///   "value": {"id": 42},
///   "headers": {"source": "web"}
/// }
/// ```
///
/// `key` and `headers` are optional. A string `value` is published as its
/// raw text; anything else as JSON.
#[instrument(skip_all, fields(topic = tracing::field::Empty))]
pub async fn publish_message(
    State(state): State<AppState>,
    request: Request,
) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();

    let response = match process(&state, &parts.headers, body).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => e.into_response(),
    };

    let elapsed = started.elapsed().as_secs_f64();
    state
        .metrics
        .record_request_duration(PUBLISH_METHOD, PUBLISH_ENDPOINT, elapsed);
    state.metrics.record_http_latency(
        PUBLISH_ENDPOINT,
        PUBLISH_METHOD,
        response.status().as_u16(),
        elapsed,
    );

    response
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
) -> Result<PublishResult, PipelineError> {
    let identity = match state.auth.authenticate_headers(headers) {
        Ok(identity) => {
            state.metrics.record_auth_attempt(AUTH_SUCCESS);
            identity
        }
        Err(e) => {
            state.metrics.record_auth_attempt(AUTH_FAILED);
            warn!(reason = %e, "Authentication failed");
            return Err(e.into());
        }
    };

    let limit = state.config.max_request_body_size;
    let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
        warn!(identity = %identity, limit, error = %e, "Request body rejected");
        PipelineError::BodyTooLarge(limit)
    })?;

    let request: PublishRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(identity = %identity, error = %e, "Malformed publish request");
        PipelineError::malformed_body(&e)
    })?;

    Span::current().record("topic", request.topic.as_str());

    if let Err(e) = validate_topic(&request.topic) {
        warn!(identity = %identity, topic = %request.topic, "Invalid topic name");
        return Err(e);
    }

    let value = encode_value(&MessageValue::Json(request.value)).map_err(|e| {
        error!(error = %e, "Failed to encode message value");
        PipelineError::from(e)
    })?;

    let record = Record::new(request.topic, value)
        .with_key(encode_key(request.key.as_deref()))
        .with_headers(encode_headers(request.headers));

    let topic = record.topic.clone();
    let value_len = record.value.len();
    debug!(identity = %identity, value_len, "Publishing record");

    // Spawned so a client disconnect cannot cancel the publish mid-flight
    let publisher = state.publisher.clone();
    let outcome = tokio::spawn(async move { publisher.publish(record).await })
        .await
        .unwrap_or_else(|e| Err(PublishError::Aborted(e.to_string())));

    match outcome {
        Ok(()) => {
            state
                .metrics
                .record_message_processed(&topic, OUTCOME_SUCCESS);
            info!(topic = %topic, value_len, "Message published");
            Ok(PublishResult::success("Message sent successfully"))
        }
        Err(e) => {
            state.metrics.record_broker_error(&topic, e.kind());
            state.metrics.record_message_processed(&topic, OUTCOME_ERROR);
            error!(topic = %topic, kind = e.kind(), error = %e, "Failed to publish message");
            Err(e.into())
        }
    }
}
