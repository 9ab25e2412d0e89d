//! In-process broker transport.
//!
//! Keeps accepted records in memory and can be scripted to fail, reject
//! acknowledgments, acknowledge late or stall. Backs the publisher and
//! router test suites.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

use crate::error::BrokerError;
use crate::models::Record;
use crate::services::publisher::{AckSender, BrokerTransport, PendingAck};

/// Scripted behavior for one `send` call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Accept and acknowledge the record.
    Succeed,
    /// Fail the write phase.
    Fail(BrokerError),
    /// Complete the write but reject the acknowledgment.
    Nack(BrokerError),
    /// Never complete the write phase.
    StallWrite,
    /// Complete the write but never acknowledge.
    StallAck,
    /// Complete the write, then store and acknowledge the record after the
    /// delay from a background task that `close` waits for.
    Delay(Duration),
}

#[derive(Default)]
pub struct InMemoryTransport {
    steps: Mutex<VecDeque<Step>>,
    /// Behavior once `steps` runs out.
    fallback: Option<BrokerError>,
    records: Arc<Mutex<Vec<Record>>>,
    in_flight: TaskTracker,
    stalled_acks: Mutex<Vec<AckSender>>,
    send_calls: AtomicU32,
    close_calls: AtomicU32,
    closed: AtomicBool,
}

impl InMemoryTransport {
    /// A transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Play `steps` in order, then accept everything.
    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A transport whose every write fails with `error`.
    pub fn failing(error: BrokerError) -> Self {
        Self {
            fallback: Some(error),
            ..Self::default()
        }
    }

    /// Records acknowledged so far, in acceptance order.
    pub async fn records(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }

    pub fn send_calls(&self) -> u32 {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn next_step(&self) -> Step {
        match self.steps.lock().await.pop_front() {
            Some(step) => step,
            None => self.fallback.clone().map_or(Step::Succeed, Step::Fail),
        }
    }
}

#[async_trait]
impl BrokerTransport for InMemoryTransport {
    async fn send(&self, record: &Record) -> Result<PendingAck, BrokerError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        match self.next_step().await {
            Step::Succeed => {
                self.records.lock().await.push(record.clone());
                Ok(PendingAck::ready(Ok(())))
            }
            Step::Fail(e) => Err(e),
            Step::Nack(e) => Ok(PendingAck::ready(Err(e))),
            Step::StallWrite => std::future::pending::<Result<PendingAck, BrokerError>>().await,
            Step::Delay(delay) => {
                let (tx, ack) = PendingAck::channel();
                let records = Arc::clone(&self.records);
                let record = record.clone();
                self.in_flight.spawn(async move {
                    tokio::time::sleep(delay).await;
                    records.lock().await.push(record);
                    let _ = tx.send(Ok(()));
                });
                Ok(ack)
            }
            Step::StallAck => {
                let (tx, ack) = PendingAck::channel();
                self.stalled_acks.lock().await.push(tx);
                Ok(ack)
            }
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.in_flight.close();
        self.in_flight.wait().await;
        self.stalled_acks.lock().await.clear();
        Ok(())
    }
}
