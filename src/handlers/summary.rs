//! Read-only JSON views over the in-memory metrics.
//!
//! # Endpoints
//!
//! - `GET /api/metrics` - Totals for publishes, broker errors and auth attempts
//! - `GET /api/topics` - Processed message count per topic
//! - `GET /api/messages` - One entry per topic/outcome with its last update
//!
//! Counts cover the lifetime of the process.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{MetricsSummaryResponse, RecentMessagesResponse, TopicsResponse};
use crate::state::AppState;

#[instrument(skip(state))]
pub async fn api_metrics(State(state): State<AppState>) -> Json<MetricsSummaryResponse> {
    Json(MetricsSummaryResponse {
        timestamp: Utc::now().timestamp(),
        metrics: state.snapshot.summary(),
    })
}

#[instrument(skip(state))]
pub async fn api_topics(State(state): State<AppState>) -> Json<TopicsResponse> {
    Json(TopicsResponse {
        topics: state.snapshot.topics(),
        timestamp: Utc::now().timestamp(),
    })
}

#[instrument(skip(state))]
pub async fn api_messages(State(state): State<AppState>) -> Json<RecentMessagesResponse> {
    Json(RecentMessagesResponse {
        messages: state.snapshot.recent_messages(),
        timestamp: Utc::now().timestamp(),
    })
}
