use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::transport::{Delivery, LogSubscription, PublishReceipt, Transport};

const MEMORY_STREAM_NAME: &str = "MEMORY";

struct Entry {
    sequence: u64,
    payload: Bytes,
    acked: bool,
    deliveries: u64,
}

/// Retained per-subject log. Entries stay until acked; fetch skips acked
/// entries, so an unacked entry is redelivered on the next fetch (the
/// in-memory equivalent of an expired ack wait).
#[derive(Default)]
struct SubjectLog {
    entries: Mutex<Vec<Entry>>,
}

/// In-memory transport with explicit-ack semantics.
///
/// Unlike a plain broadcast channel, messages are retained per subject and
/// a subscription resumes from the earliest uncommitted entry, so the
/// withhold-ack/redelivery contract can be exercised without a broker.
pub struct InMemoryTransport {
    subjects: Arc<DashMap<String, Arc<SubjectLog>>>,
    sequence: AtomicU64,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            subjects: Arc::new(DashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    #[inline]
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn get_or_create_log(&self, subject: &str) -> Arc<SubjectLog> {
        self.subjects
            .entry(subject.to_string())
            .or_insert_with(|| Arc::new(SubjectLog::default()))
            .clone()
    }

    /// Number of unacked entries on a subject. Test helper.
    pub async fn pending(&self, subject: &str) -> usize {
        match self.subjects.get(subject) {
            Some(log) => {
                let entries = log.entries.lock().await;
                entries.iter().filter(|e| !e.acked).count()
            }
            None => 0,
        }
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

struct InMemoryDelivery {
    log: Arc<SubjectLog>,
    subject: String,
    sequence: u64,
    payload: Bytes,
    deliveries: u64,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn deliveries(&self) -> u64 {
        self.deliveries
    }

    async fn ack(self: Box<Self>) -> Result<(), TransportError> {
        let mut entries = self.log.entries.lock().await;
        match entries.iter_mut().find(|e| e.sequence == self.sequence) {
            Some(entry) => {
                entry.acked = true;
                Ok(())
            }
            None => Err(TransportError::AckFailed(format!(
                "unknown sequence {}",
                self.sequence
            ))),
        }
    }
}

struct InMemorySubscription {
    subjects: Arc<DashMap<String, Arc<SubjectLog>>>,
    filter: Vec<String>,
}

#[async_trait]
impl LogSubscription for InMemorySubscription {
    async fn fetch(
        &mut self,
        max_messages: usize,
    ) -> Result<Vec<Box<dyn Delivery>>, TransportError> {
        let mut batch: Vec<Box<dyn Delivery>> = Vec::new();

        for subject in &self.filter {
            if batch.len() >= max_messages {
                break;
            }
            let log = match self.subjects.get(subject) {
                Some(log) => Arc::clone(log.value()),
                None => continue,
            };

            let mut entries = log.entries.lock().await;
            for entry in entries.iter_mut().filter(|e| !e.acked) {
                if batch.len() >= max_messages {
                    break;
                }
                entry.deliveries += 1;
                batch.push(Box::new(InMemoryDelivery {
                    log: Arc::clone(&log),
                    subject: subject.clone(),
                    sequence: entry.sequence,
                    payload: entry.payload.clone(),
                    deliveries: entry.deliveries,
                }));
            }
        }

        Ok(batch)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> Result<PublishReceipt, TransportError> {
        let log = self.get_or_create_log(subject);
        let sequence = self.next_sequence();
        let mut entries = log.entries.lock().await;
        entries.push(Entry {
            sequence,
            payload,
            acked: false,
            deliveries: 0,
        });
        Ok(PublishReceipt {
            stream: MEMORY_STREAM_NAME.to_string(),
            sequence,
        })
    }

    async fn pull_subscribe(
        &self,
        _durable: &str,
        subjects: Vec<String>,
    ) -> Result<Box<dyn LogSubscription>, TransportError> {
        for subject in &subjects {
            self.get_or_create_log(subject);
        }
        Ok(Box::new(InMemorySubscription {
            subjects: Arc::clone(&self.subjects),
            filter: subjects,
        }))
    }
}
