//! Router assembly.
//!
//! Layers wrap outermost first, so a request passes through them as:
//!
//! ```text
//! SetRequestId → PropagateRequestId → Trace → CORS → route
//!                                                     │
//!            /api/status only: RequireAuth ◀──────────┘
//! ```
//!
//! # Route Groups
//!
//! - `/health` - Liveness (no auth)
//! - `/message` - Publishing (the handler checks the API key itself, before
//!   reading the size-limited body, so every outcome lands in the request
//!   metrics)
//! - `/api/status` - Authenticated probe ([`RequireAuth`])
//! - `/api/metrics`, `/api/topics`, `/api/messages` - Metrics summaries

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::middleware::RequireAuth;
use crate::state::AppState;

/// Header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the gateway router with every route and layer in place.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let protected = Router::new()
        .route("/api/status", get(handlers::api_status))
        .layer(RequireAuth::new(state.auth.clone(), state.metrics.clone()));

    info!(
        max_body_bytes = config.max_request_body_size,
        origins = ?config.cors_allowed_origins,
        "Building router"
    );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(handlers::PUBLISH_ENDPOINT, post(handlers::publish_message))
        .route("/api/metrics", get(handlers::api_metrics))
        .route("/api/topics", get(handlers::api_topics))
        .route("/api/messages", get(handlers::api_messages))
        .merge(protected)
        .layer(cors_layer(&config.cors_allowed_origins, request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}

/// CORS for browser callers. `*` anywhere in the list opens every origin;
/// otherwise only the listed origins are allowed. Entries that are not valid
/// header values are skipped with a warning.
fn cors_layer(allowed_origins: &[String], request_id: HeaderName) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, request_id.clone()])
        .expose_headers([request_id])
}
