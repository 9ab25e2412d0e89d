//! Fuzz testing for publish request parsing and payload encoding.
//!
//! Arbitrary bodies are parsed the way `POST /message` parses them. Parse
//! failures must map to a 400 without panicking, and every parsed value must
//! encode.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_publish_request
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use publish_gateway::PipelineError;
use publish_gateway::models::{MessageValue, PublishRequest};
use publish_gateway::services::{encode_headers, encode_key, encode_value};

fuzz_target!(|data: &[u8]| {
    let request: PublishRequest = match serde_json::from_slice(data) {
        Ok(request) => request,
        Err(e) => {
            let rejection = PipelineError::malformed_body(&e);
            assert_eq!(rejection.status().as_u16(), 400);
            return;
        }
    };

    let Ok(bytes) = encode_value(&MessageValue::Json(request.value.clone())) else {
        panic!("parsed JSON value failed to encode");
    };

    match &request.value {
        serde_json::Value::String(text) => assert_eq!(bytes.as_ref(), text.as_bytes()),
        _ => assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_ok()),
    }

    if let Some(key) = encode_key(request.key.as_deref()) {
        assert!(!key.is_empty());
    }
    let _ = encode_headers(request.headers);
});
