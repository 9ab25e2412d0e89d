//! Helper functions for the Iggy transport.

use iggy::prelude::{Identifier, IggyError};

use crate::error::BrokerError;

/// Build a name-based Identifier.
///
/// Topic names are always addressed by name, so `"123"` refers to the topic
/// called `123` and never to numeric id 123.
pub fn to_identifier(name: &str) -> Result<Identifier, BrokerError> {
    Identifier::named(name).map_err(|e: IggyError| {
        tracing::debug!(name, original_error = %e, "Identifier conversion failed");
        BrokerError::InvalidRecord(format!("'{name}' is not a valid Iggy name: {e}"))
    })
}

/// Generate a random jitter value between 0.0 and 1.0.
///
/// Uses the `rand` crate's thread-local RNG so concurrent retries do not
/// line up on the same schedule.
pub fn rand_jitter() -> f64 {
    use rand::Rng;
    rand::rng().random::<f64>()
}
