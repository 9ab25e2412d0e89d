//! Payload normalization for broker records.
//!
//! JSON strings are written as their raw UTF-8 bytes (no quotes, no
//! escaping) so the common text payload stays human readable on the topic.
//! Every other JSON value is written as its canonical JSON serialization.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::EncodingError;
use crate::models::MessageValue;

/// Encode a message value into broker bytes.
pub fn encode_value(value: &MessageValue) -> Result<Bytes, EncodingError> {
    match value {
        MessageValue::Bytes(raw) => Ok(raw.clone()),
        MessageValue::Json(serde_json::Value::String(text)) => {
            Ok(Bytes::copy_from_slice(text.as_bytes()))
        }
        MessageValue::Json(other) => Ok(Bytes::from(serde_json::to_vec(other)?)),
    }
}

/// Encode an optional partition key. Empty keys are treated as absent.
pub fn encode_key(key: Option<&str>) -> Option<Bytes> {
    key.filter(|k| !k.is_empty())
        .map(|k| Bytes::copy_from_slice(k.as_bytes()))
}

/// Convert request headers into record headers.
pub fn encode_headers(headers: Option<HashMap<String, String>>) -> HashMap<String, Bytes> {
    headers
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| (name, Bytes::from(value)))
        .collect()
}
