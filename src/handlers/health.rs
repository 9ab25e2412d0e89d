//! Liveness and authenticated status endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Always 200, no authentication, no broker access
//! - `GET /api/status` - 200 for callers with a valid API key

use axum::Extension;
use axum::Json;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::middleware::Identity;
use crate::models::{HealthResponse, StatusResponse};

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// { "status": "ok", "timestamp": "2024-01-15T10:30:00Z" }
/// ```
#[instrument]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}

/// Status probe behind [`RequireAuth`](crate::middleware::RequireAuth).
#[instrument(skip_all)]
pub async fn api_status(Extension(identity): Extension<Identity>) -> Json<StatusResponse> {
    debug!(identity = %identity, "Status requested");

    Json(StatusResponse {
        status: "running".to_string(),
        timestamp: Utc::now(),
    })
}
