use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A record on its way to the broker.
///
/// Built once per request and owned by the publisher for the duration of a
/// single publish call. Header order carries no meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub topic: String,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: HashMap<String, Bytes>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn new(topic: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            value: value.into(),
            headers: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_key(mut self, key: Option<Bytes>) -> Self {
        self.key = key;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, Bytes>) -> Self {
        self.headers = headers;
        self
    }
}

/// Input accepted by the payload encoder.
///
/// HTTP bodies only ever produce `Json`; `Bytes` exists for callers that
/// already hold a raw payload.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageValue {
    Json(serde_json::Value),
    Bytes(Bytes),
}

impl From<serde_json::Value> for MessageValue {
    fn from(value: serde_json::Value) -> Self {
        MessageValue::Json(value)
    }
}

impl From<Vec<u8>> for MessageValue {
    fn from(value: Vec<u8>) -> Self {
        MessageValue::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for MessageValue {
    fn from(value: Bytes) -> Self {
        MessageValue::Bytes(value)
    }
}
