//! Durable log producer
//!
//! Publishes feed envelopes to a partitioned subject of the append log.
//! Publish is fire-and-forget: the caller never blocks on the log and
//! never sees a failure — completions are logged, and failures feed the
//! `tickflow_log_publish_failures_total` counter.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, error};

use crate::metrics;
use tickflow_feed::FeedEvent;
use tickflow_middleware::Transport;

pub const DEFAULT_TOPIC: &str = "market-data";
pub const DEFAULT_PARTITIONS: u32 = 10;

pub struct LogProducer {
    transport: Arc<dyn Transport>,
    topic: String,
    partitions: u32,
}

impl LogProducer {
    pub fn new(transport: Arc<dyn Transport>, topic: impl Into<String>, partitions: u32) -> Self {
        Self {
            transport,
            topic: topic.into(),
            partitions,
        }
    }

    /// All partition subjects of a topic, for stream provisioning and
    /// consumer ownership.
    pub fn partition_subjects(topic: &str, partitions: u32) -> Vec<String> {
        (0..partitions)
            .map(|p| format!("{}.p{}", topic, p))
            .collect()
    }

    /// Partition key for an envelope: source plus publish-time wall clock
    /// modulo the partition count.
    // TODO extract the symbol from the message and key by it, so updates for
    // one product land on one partition
    fn partition_key(&self, event: &FeedEvent) -> String {
        format!(
            "{}-{}",
            event.source,
            Utc::now().timestamp_millis() % i64::from(self.partitions)
        )
    }

    fn subject_for_key(&self, key: &str) -> String {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let partition = hasher.finish() % u64::from(self.partitions);
        format!("{}.p{}", self.topic, partition)
    }

    /// Fire-and-forget publish. Returns immediately; the send completes on
    /// a spawned task.
    pub fn publish(&self, event: &FeedEvent) {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to encode envelope, not published");
                metrics::record_publish_failure(&self.topic);
                return;
            }
        };

        let subject = self.subject_for_key(&self.partition_key(event));
        let transport = Arc::clone(&self.transport);
        let topic = self.topic.clone();

        tokio::spawn(async move {
            match transport.publish(&subject, Bytes::from(payload)).await {
                Ok(receipt) => {
                    metrics::record_publish(&topic);
                    debug!(
                        subject = %subject,
                        stream = %receipt.stream,
                        sequence = receipt.sequence,
                        "Published feed envelope"
                    );
                }
                Err(e) => {
                    metrics::record_publish_failure(&topic);
                    error!(error = %e, subject = %subject, "Failed to publish feed envelope");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tickflow_middleware::InMemoryTransport;

    fn event() -> FeedEvent {
        FeedEvent::now(r#"{"type":"ticker","product_id":"BTC-USD"}"#, "coinbase")
    }

    #[test]
    fn test_partition_subjects_enumeration() {
        let subjects = LogProducer::partition_subjects("market-data", 3);
        assert_eq!(
            subjects,
            vec!["market-data.p0", "market-data.p1", "market-data.p2"]
        );
    }

    #[test]
    fn test_subject_is_stable_for_a_key() {
        let transport = Arc::new(InMemoryTransport::new());
        let producer = LogProducer::new(transport, DEFAULT_TOPIC, DEFAULT_PARTITIONS);

        let first = producer.subject_for_key("coinbase-3");
        let second = producer.subject_for_key("coinbase-3");
        assert_eq!(first, second);
        assert!(first.starts_with("market-data.p"));
    }

    #[test]
    fn test_subject_stays_within_partition_range() {
        let transport = Arc::new(InMemoryTransport::new());
        let producer = LogProducer::new(transport, "market-data", 4);

        for i in 0..50 {
            let subject = producer.subject_for_key(&format!("coinbase-{}", i));
            let partition: u32 = subject
                .rsplit_once(".p")
                .map(|(_, p)| p.parse().unwrap())
                .unwrap();
            assert!(partition < 4);
        }
    }

    #[tokio::test]
    async fn test_publish_lands_on_one_partition() {
        let transport = Arc::new(InMemoryTransport::new());
        let producer = LogProducer::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            "market-data",
            4,
        );

        producer.publish(&event());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut pending_total = 0;
        for subject in LogProducer::partition_subjects("market-data", 4) {
            pending_total += transport.pending(&subject).await;
        }
        assert_eq!(pending_total, 1);
    }

    #[tokio::test]
    async fn test_published_envelope_roundtrips() {
        let transport = Arc::new(InMemoryTransport::new());
        let producer = LogProducer::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            "market-data",
            1,
        );

        let original = event();
        producer.publish(&original);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut sub = transport
            .pull_subscribe("test", vec!["market-data.p0".to_string()])
            .await
            .unwrap();
        let batch = sub.fetch(10).await.unwrap();
        assert_eq!(batch.len(), 1);

        let decoded: FeedEvent = serde_json::from_slice(batch[0].payload()).unwrap();
        assert_eq!(decoded, original);
    }
}
