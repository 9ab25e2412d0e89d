//! Bounded, retrying delivery of one record to the broker.
//!
//! A publish attempt has two phases, each with its own deadline:
//!
//! ```text
//! send(record) ──write_timeout──▶ PendingAck ──ack_timeout──▶ acknowledged
//! ```
//!
//! Transient broker errors are retried with exponential backoff up to
//! [`MAX_PUBLISH_ATTEMPTS`] attempts in total. A timeout in either phase ends
//! the call immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{BrokerError, PublishError};
use crate::iggy_client::rand_jitter;
use crate::models::Record;

// =============================================================================
// Constants
// =============================================================================

/// Attempts per publish call, including the first one.
pub const MAX_PUBLISH_ATTEMPTS: u32 = 3;

/// Jitter percentage for retry backoff (±20%).
const BACKOFF_JITTER_PERCENT: f64 = 0.2;

// =============================================================================
// Transport seam
// =============================================================================

/// Anything that can carry a [`Record`] to the broker.
///
/// `send` covers the write phase: it returns once the record has been handed
/// to the broker connection. The returned [`PendingAck`] resolves when the
/// broker has durably accepted it.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn send(&self, record: &Record) -> Result<PendingAck, BrokerError>;

    /// Flush in-flight appends and release the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Sending half of a [`PendingAck`].
pub type AckSender = oneshot::Sender<Result<(), BrokerError>>;

/// Broker acknowledgment for a record that has been written.
#[derive(Debug)]
pub struct PendingAck(oneshot::Receiver<Result<(), BrokerError>>);

impl PendingAck {
    pub fn channel() -> (AckSender, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx))
    }

    /// An acknowledgment that is already known.
    pub fn ready(result: Result<(), BrokerError>) -> Self {
        let (tx, ack) = Self::channel();
        let _ = tx.send(result);
        ack
    }

    /// Wait for the broker's verdict. A dropped sender counts as a lost
    /// connection.
    pub async fn wait(self) -> Result<(), BrokerError> {
        self.0.await.unwrap_or_else(|_| {
            Err(BrokerError::Unavailable(
                "acknowledgment channel dropped".to_string(),
            ))
        })
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Timeouts and backoff applied to every publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPolicy {
    pub max_attempts: u32,
    pub write_timeout: Duration,
    pub ack_timeout: Duration,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl PublishPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: MAX_PUBLISH_ATTEMPTS,
            write_timeout: config.write_timeout,
            ack_timeout: config.ack_timeout,
            retry_base_delay: config.retry_base_delay,
            retry_max_delay: config.retry_max_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based), with jitter applied.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_base_delay.as_millis() as u64;
        let max_ms = self.retry_max_delay.as_millis() as u64;

        let delay_ms = base_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
            .min(max_ms);

        // Float to int casts saturate, so huge delays cannot wrap
        let factor = 1.0 + BACKOFF_JITTER_PERCENT * (rand_jitter() * 2.0 - 1.0);
        let final_delay = (delay_ms as f64 * factor).round().max(0.0) as u64;

        Duration::from_millis(final_delay)
    }
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_PUBLISH_ATTEMPTS,
            write_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(2),
        }
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Outcome of a single attempt.
enum AttemptError {
    /// Deadline exceeded. Never retried.
    Timeout(PublishError),
    Broker(BrokerError),
}

/// Shared handle to the broker, safe to clone into every request.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn BrokerTransport>,
    policy: PublishPolicy,
    closed: Arc<AtomicBool>,
}

impl Publisher {
    pub fn new(transport: Arc<dyn BrokerTransport>, policy: PublishPolicy) -> Self {
        Self {
            transport,
            policy,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn policy(&self) -> &PublishPolicy {
        &self.policy
    }

    /// Deliver `record` and wait for the broker acknowledgment.
    ///
    /// # Errors
    ///
    /// - `PublishError::WriteTimeout` / `AckTimeout` when a phase exceeds its deadline
    /// - `PublishError::Broker` when the broker rejects the record permanently or
    ///   every attempt failed transiently
    #[instrument(
        skip(self, record),
        fields(topic = %record.topic, value_len = record.value.len(), keyed = record.key.is_some())
    )]
    pub async fn publish(&self, record: Record) -> Result<(), PublishError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.attempt(&record).await {
                Ok(()) => {
                    debug!(attempt, "Record acknowledged");
                    return Ok(());
                }
                Err(AttemptError::Timeout(e)) => {
                    warn!(attempt, error = %e, "Publish timed out");
                    return Err(e);
                }
                Err(AttemptError::Broker(e))
                    if e.is_transient() && attempt < self.policy.max_attempts =>
                {
                    let delay = self.policy.backoff_delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Publish attempt failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(AttemptError::Broker(source)) => {
                    return Err(PublishError::Broker {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    async fn attempt(&self, record: &Record) -> Result<(), AttemptError> {
        let ack = match timeout(self.policy.write_timeout, self.transport.send(record)).await {
            Ok(Ok(ack)) => ack,
            Ok(Err(e)) => return Err(AttemptError::Broker(e)),
            Err(_) => {
                return Err(AttemptError::Timeout(PublishError::WriteTimeout(
                    self.policy.write_timeout,
                )));
            }
        };

        match timeout(self.policy.ack_timeout, ack.wait()).await {
            Ok(result) => result.map_err(AttemptError::Broker),
            Err(_) => Err(AttemptError::Timeout(PublishError::AckTimeout(
                self.policy.ack_timeout,
            ))),
        }
    }

    /// Flush and close the transport. Only the first call reaches the broker.
    pub async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Publisher already closed");
            return Ok(());
        }

        info!("Closing publisher, flushing in-flight records");
        self.transport.close().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::memory::{InMemoryTransport, Step};

    fn fast_policy() -> PublishPolicy {
        PublishPolicy {
            write_timeout: Duration::from_millis(200),
            ack_timeout: Duration::from_millis(200),
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(5),
            ..PublishPolicy::default()
        }
    }

    fn publisher(transport: &Arc<InMemoryTransport>) -> Publisher {
        Publisher::new(transport.clone(), fast_policy())
    }

    fn unavailable() -> BrokerError {
        BrokerError::Unavailable("connection refused".to_string())
    }

    #[tokio::test]
    async fn test_publish_success_first_attempt() {
        let transport = Arc::new(InMemoryTransport::new());
        let record = Record::new("orders", "hello");

        publisher(&transport).publish(record.clone()).await.unwrap();

        assert_eq!(transport.send_calls(), 1);
        assert_eq!(transport.records().await, vec![record]);
    }

    #[tokio::test]
    async fn test_close_flushes_in_flight_publish() {
        let transport = Arc::new(InMemoryTransport::with_steps([Step::Delay(
            Duration::from_millis(50),
        )]));
        let publisher = publisher(&transport);
        let record = Record::new("orders", "late");

        let in_flight = tokio::spawn({
            let publisher = publisher.clone();
            let record = record.clone();
            async move { publisher.publish(record).await }
        });
        while transport.send_calls() == 0 {
            tokio::task::yield_now().await;
        }

        publisher.close().await.unwrap();

        // The record landed before close returned
        assert_eq!(transport.records().await, vec![record]);
        assert!(in_flight.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let transport = Arc::new(InMemoryTransport::with_steps([
            Step::Fail(unavailable()),
            Step::Fail(BrokerError::Append("leader moved".to_string())),
        ]));

        publisher(&transport)
            .publish(Record::new("orders", "hello"))
            .await
            .unwrap();

        assert_eq!(transport.send_calls(), 3);
        assert_eq!(transport.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let transport = Arc::new(InMemoryTransport::failing(unavailable()));

        let err = publisher(&transport)
            .publish(Record::new("orders", "hello"))
            .await
            .unwrap_err();

        assert_eq!(transport.send_calls(), MAX_PUBLISH_ATTEMPTS);
        assert_eq!(
            err,
            PublishError::Broker {
                attempts: MAX_PUBLISH_ATTEMPTS,
                source: unavailable(),
            }
        );
        assert!(transport.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_ack_is_retried() {
        let transport = Arc::new(InMemoryTransport::with_steps([Step::Nack(unavailable())]));

        publisher(&transport)
            .publish(Record::new("orders", "hello"))
            .await
            .unwrap();

        assert_eq!(transport.send_calls(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let invalid = BrokerError::InvalidRecord("key exceeds 255 bytes".to_string());
        let transport = Arc::new(InMemoryTransport::failing(invalid.clone()));

        let err = publisher(&transport)
            .publish(Record::new("orders", "hello"))
            .await
            .unwrap_err();

        assert_eq!(transport.send_calls(), 1);
        assert_eq!(
            err,
            PublishError::Broker {
                attempts: 1,
                source: invalid,
            }
        );
        assert_eq!(err.kind(), "invalid_record");
    }

    #[tokio::test]
    async fn test_write_timeout_is_terminal() {
        let transport = Arc::new(InMemoryTransport::with_steps([Step::StallWrite]));
        let policy = fast_policy();

        let err = publisher(&transport)
            .publish(Record::new("orders", "hello"))
            .await
            .unwrap_err();

        assert_eq!(err, PublishError::WriteTimeout(policy.write_timeout));
        assert_eq!(transport.send_calls(), 1);
    }

    #[tokio::test]
    async fn test_ack_timeout_is_terminal() {
        let transport = Arc::new(InMemoryTransport::with_steps([Step::StallAck]));
        let policy = fast_policy();

        let err = publisher(&transport)
            .publish(Record::new("orders", "hello"))
            .await
            .unwrap_err();

        assert_eq!(err, PublishError::AckTimeout(policy.ack_timeout));
        assert_eq!(transport.send_calls(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_later_sends() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = publisher(&transport);

        publisher.close().await.unwrap();
        publisher.close().await.unwrap();
        assert_eq!(transport.close_calls(), 1);

        let err = publisher
            .publish(Record::new("orders", "late"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "closed");
    }

    #[tokio::test]
    async fn test_pending_ack_dropped_sender_is_unavailable() {
        let (tx, ack) = PendingAck::channel();
        drop(tx);
        assert!(matches!(ack.wait().await, Err(BrokerError::Unavailable(_))));
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = PublishPolicy {
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_millis(300),
            ..PublishPolicy::default()
        };

        for _ in 0..50 {
            let first = policy.backoff_delay(1).as_millis();
            let second = policy.backoff_delay(2).as_millis();
            let capped = policy.backoff_delay(10).as_millis();

            assert!((80..=120).contains(&first), "first delay {first}");
            assert!((160..=240).contains(&second), "second delay {second}");
            assert!((240..=360).contains(&capped), "capped delay {capped}");
        }
    }

    #[test]
    fn test_backoff_with_huge_delays_saturates() {
        let policy = PublishPolicy {
            retry_base_delay: Duration::from_millis(u64::MAX / 2),
            retry_max_delay: Duration::from_millis(u64::MAX),
            ..PublishPolicy::default()
        };

        for attempt in [1, 2, 3, 64] {
            // Must not overflow; the delay only has to stay non-zero
            assert!(policy.backoff_delay(attempt) > Duration::ZERO);
        }
    }

    #[test]
    fn test_policy_from_config() {
        let config = Config {
            write_timeout: Duration::from_secs(3),
            ack_timeout: Duration::from_secs(4),
            ..Config::default()
        };

        let policy = PublishPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.write_timeout, Duration::from_secs(3));
        assert_eq!(policy.ack_timeout, Duration::from_secs(4));
    }
}
