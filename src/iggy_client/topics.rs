//! Topic bookkeeping for the Iggy transport: which topics are provisioned,
//! their partitions, and which partition a record goes to.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::info;

/// Upper bound on cached topics. Topic names come from clients, so the cache
/// is reset once it fills instead of growing without limit.
pub const MAX_CACHED_TOPICS: usize = 10_000;

/// Partition layout of a provisioned topic.
#[derive(Debug)]
pub struct TopicPartitions {
    ids: Vec<u32>,
    next: AtomicU64,
}

impl TopicPartitions {
    /// `None` when the topic reports no partitions.
    pub fn new(mut ids: Vec<u32>) -> Option<Self> {
        if ids.is_empty() {
            return None;
        }
        ids.sort_unstable();
        ids.dedup();

        Some(Self {
            ids,
            next: AtomicU64::new(0),
        })
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Pick the partition for a record.
    ///
    /// A key always maps to the same partition for a given layout; records
    /// without a key rotate over every partition.
    pub fn select(&self, key: Option<&[u8]>) -> u32 {
        let slot = match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                hasher.finish()
            }
            None => self.next.fetch_add(1, Ordering::Relaxed),
        };

        let index = (slot % self.ids.len() as u64) as usize;
        self.ids.get(index).copied().unwrap_or_default()
    }
}

/// Topics known to exist in the gateway stream.
pub struct TopicCache {
    entries: RwLock<HashMap<String, Arc<TopicPartitions>>>,
    capacity: usize,
}

impl TopicCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    pub async fn get(&self, topic: &str) -> Option<Arc<TopicPartitions>> {
        self.entries.read().await.get(topic).cloned()
    }

    pub async fn insert(&self, topic: &str, partitions: Arc<TopicPartitions>) {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity && !entries.contains_key(topic) {
            info!(
                cached = entries.len(),
                "Topic cache full, clearing it"
            );
            entries.clear();
        }
        entries.insert(topic.to_string(), partitions);
    }

    /// Forget `topic` so the next publish looks it up again.
    pub async fn evict(&self, topic: &str) {
        self.entries.write().await.remove(topic);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
