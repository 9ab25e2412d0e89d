//! Fuzz testing for the topic grammar.
//!
//! Topic names arrive straight from request bodies, so the grammar check must
//! never panic and must agree with a plain character-by-character reading of
//! the rules.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the validation fuzz target
//! cargo +nightly fuzz run fuzz_validation
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use publish_gateway::validation::{MAX_TOPIC_LENGTH, is_valid_topic, validate_topic};

fuzz_target!(|data: &[u8]| {
    let Ok(topic) = std::str::from_utf8(data) else {
        return;
    };

    let valid = is_valid_topic(topic);
    assert_eq!(valid, validate_topic(topic).is_ok());

    if valid {
        assert!(!topic.is_empty() && topic.len() <= MAX_TOPIC_LENGTH);
        assert!(!topic.starts_with('.') && !topic.starts_with('_'));
        assert!(
            topic
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        );
    }
});
