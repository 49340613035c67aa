//! Durable log consumer pool
//!
//! A fixed pool of workers pulls envelopes from the append log under
//! manual acknowledgment. Each worker owns a disjoint set of partitions,
//! so a partition has at most one in-flight message while the pool still
//! runs fully concurrent across partitions. `Persisted` and `Ignored`
//! outcomes commit the message; `Failed` withholds the ack and leaves
//! redelivery to the broker — unbounded, with no dead-letter diversion.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dispatcher::{DispatchOutcome, Dispatcher, FailureKind};
use crate::metrics;
use crate::producer::{DEFAULT_PARTITIONS, DEFAULT_TOPIC};
use tickflow_feed::FeedEvent;
use tickflow_middleware::{Delivery, LogSubscription, Transport, TransportError};

const PATH_LABEL: &str = "log";

/// Pause between fetches when the log is idle.
const IDLE_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub topic: String,
    pub group: String,
    pub concurrency: usize,
    pub partitions: u32,
    pub batch_size: usize,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            group: "market-data-consumer".to_string(),
            concurrency: 4,
            partitions: DEFAULT_PARTITIONS,
            batch_size: 500,
        }
    }
}

impl ConsumerSettings {
    /// Partition subjects owned by one worker. Ownership is static:
    /// partition p belongs to worker p mod concurrency.
    fn subjects_for_worker(&self, worker: usize) -> Vec<String> {
        (0..self.partitions)
            .filter(|p| (*p as usize) % self.concurrency == worker)
            .map(|p| format!("{}.p{}", self.topic, p))
            .collect()
    }
}

pub struct ConsumerPool;

impl ConsumerPool {
    /// Open one durable subscription per worker and spawn the pool.
    pub async fn spawn(
        transport: Arc<dyn Transport>,
        settings: ConsumerSettings,
        dispatcher: Arc<Dispatcher>,
        shutdown: CancellationToken,
    ) -> Result<JoinSet<()>, TransportError> {
        let mut tasks = JoinSet::new();

        for worker in 0..settings.concurrency {
            let subjects = settings.subjects_for_worker(worker);
            if subjects.is_empty() {
                continue;
            }
            let durable = format!("{}-{}", settings.group, worker);
            let subscription = transport.pull_subscribe(&durable, subjects.clone()).await?;

            info!(worker, durable = %durable, subjects = ?subjects, "Starting log consumer worker");

            let dispatcher = Arc::clone(&dispatcher);
            let shutdown = shutdown.clone();
            let batch_size = settings.batch_size;
            tasks.spawn(async move {
                worker_loop(worker, subscription, dispatcher, batch_size, shutdown).await;
            });
        }

        Ok(tasks)
    }
}

async fn worker_loop(
    worker: usize,
    mut subscription: Box<dyn LogSubscription>,
    dispatcher: Arc<Dispatcher>,
    batch_size: usize,
    shutdown: CancellationToken,
) {
    loop {
        let batch = tokio::select! {
            _ = shutdown.cancelled() => break,
            fetched = subscription.fetch(batch_size) => match fetched {
                Ok(batch) => batch,
                Err(e) => {
                    error!(worker, error = %e, "Fetch failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }
        };

        if batch.is_empty() {
            tokio::time::sleep(IDLE_BACKOFF).await;
            continue;
        }

        // Drain the fetched batch even if shutdown fires mid-batch; the
        // next iteration observes the token.
        for delivery in batch {
            process_delivery(worker, delivery, &dispatcher).await;
        }
    }

    info!(worker, "Log consumer worker stopped");
}

async fn process_delivery(worker: usize, delivery: Box<dyn Delivery>, dispatcher: &Dispatcher) {
    let subject = delivery.subject().to_string();
    let attempt = delivery.deliveries();

    let outcome = match serde_json::from_slice::<FeedEvent>(delivery.payload()) {
        Ok(event) => dispatcher.dispatch(&event.message).await,
        Err(e) => {
            warn!(worker, error = %e, subject = %subject, "Undecodable envelope");
            DispatchOutcome::Failed(FailureKind::Internal)
        }
    };
    metrics::record_dispatch(PATH_LABEL, outcome.label());

    match outcome {
        DispatchOutcome::Persisted | DispatchOutcome::Ignored => {
            if let Err(e) = delivery.ack().await {
                // The message stays uncommitted; redelivery will duplicate it
                error!(worker, error = %e, subject = %subject, "Ack failed");
            }
        }
        DispatchOutcome::Failed(kind) => {
            metrics::record_ack_withheld(worker);
            warn!(
                worker,
                ?kind,
                subject = %subject,
                attempt,
                "Dispatch failed, withholding ack for redelivery"
            );
            // Dropped without ack: the broker redelivers from the earliest
            // uncommitted offset
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTickerStore, TickerStore};
    use bytes::Bytes;
    use tickflow_middleware::InMemoryTransport;

    fn settings(concurrency: usize, partitions: u32) -> ConsumerSettings {
        ConsumerSettings {
            topic: "market-data".to_string(),
            group: "test-group".to_string(),
            concurrency,
            partitions,
            batch_size: 100,
        }
    }

    fn wiring() -> (Arc<InMemoryTransport>, Arc<MemoryTickerStore>, Arc<Dispatcher>) {
        let transport = Arc::new(InMemoryTransport::new());
        let store = Arc::new(MemoryTickerStore::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store) as Arc<dyn TickerStore>,
            "coinbase",
        ));
        (transport, store, dispatcher)
    }

    async fn publish_ticker(transport: &InMemoryTransport, subject: &str, product_id: &str) {
        let message = format!(
            r#"{{"type":"ticker","product_id":"{}","price":"100.00"}}"#,
            product_id
        );
        let event = FeedEvent::now(message, "coinbase");
        transport
            .publish(subject, Bytes::from(serde_json::to_vec(&event).unwrap()))
            .await
            .unwrap();
    }

    #[test]
    fn test_partition_ownership_is_disjoint_and_complete() {
        let settings = settings(4, 10);
        let mut seen = Vec::new();
        for worker in 0..4 {
            seen.extend(settings.subjects_for_worker(worker));
        }
        seen.sort();
        let mut expected: Vec<String> =
            (0..10).map(|p| format!("market-data.p{}", p)).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_successful_dispatch_commits() {
        let (transport, store, dispatcher) = wiring();
        publish_ticker(&transport, "market-data.p0", "BTC-USD").await;

        let shutdown = CancellationToken::new();
        let mut tasks = ConsumerPool::spawn(
            Arc::clone(&transport) as Arc<dyn Transport>,
            settings(1, 1),
            dispatcher,
            shutdown.clone(),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(transport.pending("market-data.p0").await, 0);

        shutdown.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_ignored_messages_also_commit() {
        let (transport, store, dispatcher) = wiring();
        let event = FeedEvent::now(r#"{"type":"heartbeat"}"#, "coinbase");
        transport
            .publish(
                "market-data.p0",
                Bytes::from(serde_json::to_vec(&event).unwrap()),
            )
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let mut tasks = ConsumerPool::spawn(
            Arc::clone(&transport) as Arc<dyn Transport>,
            settings(1, 1),
            dispatcher,
            shutdown.clone(),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty().await);
        assert_eq!(transport.pending("market-data.p0").await, 0);

        shutdown.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_failed_dispatch_withholds_ack_then_duplicates_on_recovery() {
        let (transport, store, dispatcher) = wiring();
        publish_ticker(&transport, "market-data.p0", "BTC-USD").await;

        // Store is down: dispatch fails, ack is withheld
        store.set_fail_inserts(true);

        let shutdown = CancellationToken::new();
        let mut tasks = ConsumerPool::spawn(
            Arc::clone(&transport) as Arc<dyn Transport>,
            settings(1, 1),
            dispatcher,
            shutdown.clone(),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty().await);
        assert_eq!(transport.pending("market-data.p0").await, 1);

        // Store recovers: the redelivered envelope persists and commits
        store.set_fail_inserts(false);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(transport.pending("market-data.p0").await, 0);

        shutdown.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_undecodable_envelope_is_withheld() {
        let (transport, store, dispatcher) = wiring();
        transport
            .publish("market-data.p0", Bytes::from("not an envelope"))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let mut tasks = ConsumerPool::spawn(
            Arc::clone(&transport) as Arc<dyn Transport>,
            settings(1, 1),
            dispatcher,
            shutdown.clone(),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty().await);
        assert_eq!(transport.pending("market-data.p0").await, 1);

        shutdown.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_concurrent_workers_persist_every_distinct_message() {
        let (transport, store, dispatcher) = wiring();
        let settings = settings(4, 8);

        // 16 distinct tickers spread across all partitions
        for i in 0..16 {
            let subject = format!("market-data.p{}", i % 8);
            publish_ticker(&transport, &subject, &format!("SYM-{}", i)).await;
        }

        let shutdown = CancellationToken::new();
        let mut tasks = ConsumerPool::spawn(
            Arc::clone(&transport) as Arc<dyn Transport>,
            settings,
            dispatcher,
            shutdown.clone(),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.len().await, 16);

        shutdown.cancel();
        while tasks.join_next().await.is_some() {}
    }
}
