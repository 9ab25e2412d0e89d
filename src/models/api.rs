use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /message`.
///
/// `value` is required but may be any JSON type, including `null`.
/// An absent or empty `key` means the record carries no partition key.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// Target topic, checked against the topic grammar
    pub topic: String,
    /// Optional partition key
    #[serde(default)]
    pub key: Option<String>,
    /// Message payload
    pub value: serde_json::Value,
    /// Optional record headers
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

/// Outcome returned for every `POST /message` call that passed authentication.
///
/// Exactly one of `message` / `error` is present.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PublishResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Response of the authenticated `/api/status` probe.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// `GET /api/metrics` response.
#[derive(Debug, Serialize)]
pub struct MetricsSummaryResponse {
    /// Unix seconds
    pub timestamp: i64,
    pub metrics: MetricsSummary,
}

#[derive(Debug, Serialize)]
pub struct MetricsSummary {
    pub messages_processed: OutcomeCounts,
    pub broker_errors: u64,
    pub auth_attempts: AuthCounts,
    pub request_duration_sum: f64,
    pub total_messages: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct OutcomeCounts {
    pub success: u64,
    pub error: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct AuthCounts {
    pub success: u64,
    pub failed: u64,
}

/// `GET /api/topics` response.
#[derive(Debug, Serialize)]
pub struct TopicsResponse {
    pub topics: Vec<TopicSummary>,
    /// Unix seconds
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct TopicSummary {
    pub name: String,
    #[serde(rename = "messageCount")]
    pub message_count: u64,
}

/// `GET /api/messages` response.
#[derive(Debug, Serialize)]
pub struct RecentMessagesResponse {
    pub messages: Vec<RecentMessage>,
    /// Unix seconds
    pub timestamp: i64,
}

/// One topic/outcome series with at least one processed message.
#[derive(Debug, Serialize)]
pub struct RecentMessage {
    pub topic: String,
    pub status: String,
    pub count: u64,
    /// Last time this series changed
    pub timestamp: DateTime<Utc>,
}
