//! Topic name grammar.
//!
//! A topic name is valid when:
//! - its length is between 1 and 249 bytes inclusive
//! - every character is an ASCII letter, ASCII digit, `.`, `_` or `-`
//! - it does not start with `.` or `_` (reserved for internal topics)
//!
//! A leading `-` is allowed.

use crate::error::PipelineError;

/// Maximum topic name length.
pub const MAX_TOPIC_LENGTH: usize = 249;

/// Check a topic name against the grammar. Never fails, never allocates.
pub fn is_valid_topic(topic: &str) -> bool {
    let bytes = topic.as_bytes();

    if bytes.is_empty() || bytes.len() > MAX_TOPIC_LENGTH {
        return false;
    }

    if !bytes.iter().all(|&b| is_topic_char(b)) {
        return false;
    }

    !matches!(bytes.first(), Some(b'.' | b'_'))
}

fn is_topic_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')
}

/// Grammar check that yields the 400 rejection used by the publish handler.
pub fn validate_topic(topic: &str) -> Result<(), PipelineError> {
    if is_valid_topic(topic) {
        Ok(())
    } else {
        Err(PipelineError::Validation("Invalid topic name".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_topics() {
        assert!(is_valid_topic("orders"));
        assert!(is_valid_topic("orders.created"));
        assert!(is_valid_topic("orders_v2"));
        assert!(is_valid_topic("ORDERS-2024"));
        assert!(is_valid_topic("a"));
        assert!(is_valid_topic("123"));
    }

    #[test]
    fn test_leading_hyphen_is_allowed() {
        assert!(is_valid_topic("-orders"));
        assert!(is_valid_topic("-"));
    }

    #[test]
    fn test_reserved_leading_characters() {
        assert!(!is_valid_topic(".bad"));
        assert!(!is_valid_topic("_internal"));
        assert!(!is_valid_topic("."));
        assert!(!is_valid_topic("_"));
    }

    #[test]
    fn test_trailing_and_repeated_specials_are_allowed() {
        assert!(is_valid_topic("orders."));
        assert!(is_valid_topic("orders__v2"));
        assert!(is_valid_topic("a..b"));
    }

    #[test]
    fn test_length_bounds() {
        assert!(!is_valid_topic(""));
        assert!(is_valid_topic(&"a".repeat(249)));
        assert!(!is_valid_topic(&"a".repeat(250)));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(!is_valid_topic("orders created"));
        assert!(!is_valid_topic("orders/created"));
        assert!(!is_valid_topic("orders@v1"));
        assert!(!is_valid_topic("orders\n"));
        assert!(!is_valid_topic("zamówienia"));
        assert!(!is_valid_topic("топик"));
    }

    #[test]
    fn test_multibyte_name_is_rejected_even_when_short() {
        // 2 chars, 4 bytes: rejected for the characters, not the length
        assert!(!is_valid_topic("éé"));
    }

    #[test]
    fn test_repeated_checks_agree() {
        let long = "x".repeat(250);
        for topic in ["orders", ".bad", "", long.as_str(), "-ok"] {
            assert_eq!(is_valid_topic(topic), is_valid_topic(topic));
        }
    }

    /// Cross-check against a direct transcription of the grammar.
    #[test]
    fn test_matches_reference_predicate() {
        let reference = |t: &str| {
            let len_ok = (1..=249).contains(&t.len());
            let chars_ok = t
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
            let first_ok = !t.starts_with('.') && !t.starts_with('_');
            len_ok && chars_ok && first_ok
        };

        let samples = [
            "", "a", ".", "_", "-", "a.b", "_a", ".a", "-a", "a b", "a\tb", "a:b", "ü", "A9_.-",
        ];
        for sample in samples {
            assert_eq!(is_valid_topic(sample), reference(sample), "topic {sample:?}");
        }
    }

    #[test]
    fn test_validate_topic_maps_to_validation_error() {
        assert!(validate_topic("orders").is_ok());
        let err = validate_topic(".bad").unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(err.to_string(), "Invalid topic name");
    }
}
