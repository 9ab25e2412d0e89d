//! [`BrokerTransport`] backed by an Apache Iggy server.
//!
//! Every gateway topic lives in a single configured stream. Topics are
//! created on first use and remembered, with their partitions, so later
//! publishes skip the lookup.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      IggyTransport                       │
//! │  send(record)                                            │
//! │    ├─ ensure_topic      (cached get-or-create)           │
//! │    ├─ pick partition    (key hash | round robin)         │
//! │    ├─ build message     (payload, headers)               │
//! │    └─ spawn append  ──▶ PendingAck                       │
//! │         └─ send_messages, then fsync the partition       │
//! │  close()                                                 │
//! │    └─ wait for in-flight appends, then disconnect        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! A record is acknowledged only after Iggy has flushed the partition's
//! unsaved buffer to disk with fsync. The append runs on a tracked task
//! bounded by the append timeout, so a record handed to the transport is
//! still delivered after the HTTP caller goes away, and `close` does not
//! return before it settles.

mod helpers;
mod topics;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use iggy::prelude::*;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, BrokerError};
use crate::models::Record;
use crate::services::{BrokerTransport, PendingAck};

pub use helpers::{rand_jitter, to_identifier};
pub use topics::{MAX_CACHED_TOPICS, TopicCache, TopicPartitions};

/// Longest partition key Iggy accepts.
pub const MAX_KEY_LENGTH: usize = 255;

/// Iggy-backed broker transport.
///
/// Cheap to share behind an `Arc`; all state is internally synchronized.
pub struct IggyTransport {
    client: Arc<IggyClient>,
    stream: String,
    stream_id: Identifier,
    topic_partitions: u32,
    replication_factor: Option<u8>,
    /// Topics known to exist. Entries are dropped when an append fails so the
    /// next publish re-checks the topic.
    topics: Arc<TopicCache>,
    /// Bound on one append (write plus fsync) and on the flush in `close`
    append_timeout: Duration,
    in_flight: TaskTracker,
}

impl IggyTransport {
    /// Connect to the Iggy server and make sure the gateway stream exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionFailed` if the connection string is invalid
    /// or the server is unreachable, and `AppError::StreamError` if the stream
    /// cannot be created.
    #[instrument(skip(config), fields(connection_string = %config.iggy_connection_string, stream = %config.stream))]
    pub async fn connect(config: &Config) -> AppResult<Self> {
        info!("Initializing Iggy client");

        let client = IggyClient::from_connection_string(&config.iggy_connection_string)
            .map_err(|e| AppError::ConnectionFailed(e.to_string()))?;

        client
            .connect()
            .await
            .map_err(|e| AppError::ConnectionFailed(e.to_string()))?;
        info!("Successfully connected to Iggy server");

        let stream_id = Identifier::named(&config.stream)
            .map_err(|e| AppError::ConfigError(format!("Invalid IGGY_STREAM: {e}")))?;

        let transport = Self {
            client: Arc::new(client),
            stream: config.stream.clone(),
            stream_id,
            topic_partitions: config.topic_partitions,
            replication_factor: config.replication_factor,
            topics: Arc::new(TopicCache::new(MAX_CACHED_TOPICS)),
            append_timeout: config.ack_timeout,
            in_flight: TaskTracker::new(),
        };

        transport.ensure_stream().await?;

        Ok(transport)
    }

    /// Ensure the gateway stream exists, creating it if necessary.
    #[instrument(skip(self), fields(stream = %self.stream))]
    pub async fn ensure_stream(&self) -> AppResult<()> {
        match self.client.get_stream(&self.stream_id).await {
            Ok(Some(_)) => {
                debug!("Stream already exists");
                Ok(())
            }
            Ok(None) | Err(_) => {
                info!("Creating stream");
                self.client
                    .create_stream(&self.stream)
                    .await
                    .map_err(|e| AppError::StreamError(e.to_string()))?;
                Ok(())
            }
        }
    }

    async fn lookup_topic(&self, topic_id: &Identifier) -> Option<TopicDetails> {
        self.client
            .get_topic(&self.stream_id, topic_id)
            .await
            .ok()
            .flatten()
    }

    /// Ensure `topic` exists in the gateway stream, creating it on first use,
    /// and return its partitions.
    ///
    /// A concurrent creation by another request is not an error: the topic is
    /// looked up again after every create call.
    #[instrument(skip(self, topic_id))]
    async fn ensure_topic(
        &self,
        topic: &str,
        topic_id: &Identifier,
    ) -> Result<Arc<TopicPartitions>, BrokerError> {
        if let Some(partitions) = self.topics.get(topic).await {
            return Ok(partitions);
        }

        let details = match self.lookup_topic(topic_id).await {
            Some(details) => details,
            None => {
                info!(
                    stream = %self.stream,
                    topic,
                    partitions = self.topic_partitions,
                    "Creating topic"
                );

                let created = self
                    .client
                    .create_topic(
                        &self.stream_id,
                        topic,
                        self.topic_partitions,
                        Default::default(),
                        self.replication_factor,
                        IggyExpiry::NeverExpire,
                        MaxTopicSize::Unlimited,
                    )
                    .await;

                match (created, self.lookup_topic(topic_id).await) {
                    (_, Some(details)) => details,
                    (Err(e), None) => return Err(BrokerError::Provisioning(e.to_string())),
                    (Ok(_), None) => {
                        return Err(BrokerError::Provisioning(format!(
                            "topic '{topic}' not found after creation"
                        )));
                    }
                }
            }
        };

        let partitions = TopicPartitions::new(details.partitions.iter().map(|p| p.id).collect())
            .map(Arc::new)
            .ok_or_else(|| {
                BrokerError::Provisioning(format!("topic '{topic}' has no partitions"))
            })?;

        self.topics.insert(topic, Arc::clone(&partitions)).await;
        Ok(partitions)
    }

    /// Translate a record into an Iggy message.
    ///
    /// The key only routes the record; it is checked against Iggy's key limit
    /// so every broker accepts the same records.
    fn build_message(record: &Record) -> Result<IggyMessage, BrokerError> {
        let invalid = |e: IggyError| BrokerError::InvalidRecord(e.to_string());

        if let Some(key) = &record.key
            && key.len() > MAX_KEY_LENGTH
        {
            return Err(BrokerError::InvalidRecord(format!(
                "key is {} bytes, limit is {MAX_KEY_LENGTH}",
                key.len()
            )));
        }

        if record.headers.is_empty() {
            return IggyMessage::builder()
                .payload(record.value.clone())
                .build()
                .map_err(invalid);
        }

        let mut user_headers = HashMap::with_capacity(record.headers.len());
        for (name, value) in &record.headers {
            let text = std::str::from_utf8(value).map_err(|_| {
                BrokerError::InvalidRecord(format!("header '{name}' is not valid UTF-8"))
            })?;
            user_headers.insert(
                HeaderKey::new(name).map_err(invalid)?,
                HeaderValue::from_str(text).map_err(invalid)?,
            );
        }

        IggyMessage::builder()
            .payload(record.value.clone())
            .user_headers(user_headers)
            .build()
            .map_err(invalid)
    }
}

/// Run one append, giving up after `limit` so a hung connection cannot pin
/// the task (and `close`) forever.
async fn bounded_append<F>(limit: Duration, append: F) -> Result<(), BrokerError>
where
    F: Future<Output = Result<(), BrokerError>>,
{
    timeout(limit, append).await.unwrap_or_else(|_| {
        Err(BrokerError::Unavailable(format!(
            "append not settled within {limit:?}"
        )))
    })
}

#[async_trait]
impl BrokerTransport for IggyTransport {
    async fn send(&self, record: &Record) -> Result<PendingAck, BrokerError> {
        if self.in_flight.is_closed() {
            return Err(BrokerError::Closed);
        }

        let topic_id = to_identifier(&record.topic)?;
        let message = Self::build_message(record)?;
        let partitions = self.ensure_topic(&record.topic, &topic_id).await?;
        let partition_id = partitions.select(record.key.as_deref());

        let (ack_tx, ack) = PendingAck::channel();
        let client = Arc::clone(&self.client);
        let stream_id = self.stream_id.clone();
        let topics = Arc::clone(&self.topics);
        let topic = record.topic.clone();
        let append_timeout = self.append_timeout;

        self.in_flight.spawn(async move {
            let append = async {
                let mut messages = vec![message];
                client
                    .send_messages(
                        &stream_id,
                        &topic_id,
                        &Partitioning::partition_id(partition_id),
                        &mut messages,
                    )
                    .await
                    .map_err(|e| BrokerError::Append(e.to_string()))?;

                // Acknowledge only what is on disk
                client
                    .flush_unsaved_buffer(&stream_id, &topic_id, partition_id, true)
                    .await
                    .map_err(|e| BrokerError::Append(format!("flush failed: {e}")))
            };

            let result = bounded_append(append_timeout, append).await;

            if let Err(e) = &result {
                warn!(topic = %topic, partition_id, error = %e, "Append failed");
                topics.evict(&topic).await;
            }

            // The publisher may have stopped waiting (ack timeout)
            let _ = ack_tx.send(result);
        });

        Ok(ack)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.in_flight.close();

        let pending = self.in_flight.len();
        if pending > 0 {
            info!(pending, "Waiting for in-flight appends");
        }
        if timeout(self.append_timeout, self.in_flight.wait())
            .await
            .is_err()
        {
            warn!(
                abandoned = self.in_flight.len(),
                "In-flight appends did not settle, disconnecting anyway"
            );
        }

        self.client.disconnect().await.map_err(|e| {
            error!(error = %e, "Failed to disconnect from Iggy server");
            BrokerError::Unavailable(e.to_string())
        })?;

        info!("Disconnected from Iggy server");
        Ok(())
    }
}
