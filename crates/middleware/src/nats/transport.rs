use std::time::Duration;

use async_nats::jetstream::consumer::{pull, AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::stream::{Config, RetentionPolicy, StorageType};
use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::info;

use crate::error::TransportError;
use crate::transport::{Delivery, LogSubscription, PublishReceipt, Transport};

/// How long a fetch waits for messages before returning a short batch.
const FETCH_EXPIRES: Duration = Duration::from_secs(5);

/// Redelivery delay for unacked messages.
const ACK_WAIT: Duration = Duration::from_secs(30);

/// NATS JetStream transport. One stream carries all partition subjects;
/// durable pull consumers with explicit ack provide the commit contract.
pub struct NatsTransport {
    jetstream: Context,
    stream: String,
}

impl NatsTransport {
    /// Create a transport from an existing client.
    pub fn new(client: async_nats::Client, stream: impl Into<String>) -> Self {
        Self {
            jetstream: jetstream::new(client),
            stream: stream.into(),
        }
    }

    /// Connect to a NATS server and create the transport.
    pub async fn connect(url: &str, stream: impl Into<String>) -> Result<Self, TransportError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(client, stream))
    }

    /// Create or get the backing stream for the given subjects.
    pub async fn ensure_stream(&self, subjects: Vec<String>) -> Result<(), TransportError> {
        let config = Config {
            name: self.stream.clone(),
            subjects,
            retention: RetentionPolicy::Limits,
            storage: StorageType::File,
            max_age: Duration::from_secs(24 * 60 * 60),
            ..Default::default()
        };

        self.jetstream
            .get_or_create_stream(config)
            .await
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("stream creation failed: {}", e))
            })?;

        Ok(())
    }
}

struct NatsDelivery {
    message: jetstream::message::Message,
    deliveries: u64,
}

#[async_trait]
impl Delivery for NatsDelivery {
    fn subject(&self) -> &str {
        self.message.subject.as_str()
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn deliveries(&self) -> u64 {
        self.deliveries
    }

    async fn ack(self: Box<Self>) -> Result<(), TransportError> {
        self.message
            .ack()
            .await
            .map_err(|e| TransportError::AckFailed(e.to_string()))
    }
}

struct NatsSubscription {
    consumer: PullConsumer,
}

#[async_trait]
impl LogSubscription for NatsSubscription {
    async fn fetch(
        &mut self,
        max_messages: usize,
    ) -> Result<Vec<Box<dyn Delivery>>, TransportError> {
        let messages = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(FETCH_EXPIRES)
            .messages()
            .await
            .map_err(|e| TransportError::FetchFailed(e.to_string()))?;

        let mut batch: Vec<Box<dyn Delivery>> = Vec::new();
        tokio::pin!(messages);
        while let Some(result) = messages.next().await {
            let message = result.map_err(|e| TransportError::FetchFailed(e.to_string()))?;
            let deliveries = message.info().map(|i| i.delivered as u64).unwrap_or(1);
            batch.push(Box::new(NatsDelivery {
                message,
                deliveries,
            }));
        }
        Ok(batch)
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> Result<PublishReceipt, TransportError> {
        let ack = self
            .jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))?
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))?;

        Ok(PublishReceipt {
            stream: ack.stream,
            sequence: ack.sequence,
        })
    }

    async fn pull_subscribe(
        &self,
        durable: &str,
        subjects: Vec<String>,
    ) -> Result<Box<dyn LogSubscription>, TransportError> {
        let consumer = self
            .jetstream
            .get_stream(&self.stream)
            .await
            .map_err(|e| TransportError::SubscribeFailed(format!("stream not found: {}", e)))?
            .get_or_create_consumer(
                durable,
                pull::Config {
                    durable_name: Some(durable.to_string()),
                    filter_subjects: subjects.clone(),
                    // Resume from the earliest uncommitted message
                    deliver_policy: DeliverPolicy::All,
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: ACK_WAIT,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        info!(
            stream = %self.stream,
            durable = %durable,
            subjects = ?subjects,
            "Opened durable pull subscription"
        );

        Ok(Box::new(NatsSubscription { consumer }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running NATS server with JetStream
    // Run: docker run -p 4222:4222 nats:latest -js

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_publish_returns_receipt() {
        let transport = NatsTransport::connect("nats://localhost:4222", "TICKFLOW_TEST")
            .await
            .unwrap();
        transport
            .ensure_stream(vec!["tickflow-test.>".to_string()])
            .await
            .unwrap();

        let receipt = transport
            .publish("tickflow-test.p0", Bytes::from("hello"))
            .await
            .unwrap();
        assert_eq!(receipt.stream, "TICKFLOW_TEST");
        assert!(receipt.sequence > 0);
    }

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_fetch_and_ack_roundtrip() {
        let transport = NatsTransport::connect("nats://localhost:4222", "TICKFLOW_TEST")
            .await
            .unwrap();
        transport
            .ensure_stream(vec!["tickflow-test.>".to_string()])
            .await
            .unwrap();

        transport
            .publish("tickflow-test.p1", Bytes::from("payload"))
            .await
            .unwrap();

        let mut sub = transport
            .pull_subscribe("test-worker-1", vec!["tickflow-test.p1".to_string()])
            .await
            .unwrap();

        let batch = sub.fetch(10).await.unwrap();
        assert!(!batch.is_empty());
        for delivery in batch {
            delivery.ack().await.unwrap();
        }
    }
}
