use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Receipt returned once the log has accepted a published message.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub stream: String,
    pub sequence: u64,
}

/// A single delivered message. Acknowledgment consumes the delivery;
/// a delivery that is dropped without `ack` stays uncommitted and will be
/// redelivered by the log.
#[async_trait]
pub trait Delivery: Send {
    /// Subject (partition) the message was delivered from.
    fn subject(&self) -> &str;

    /// Message payload without copying.
    fn payload(&self) -> &[u8];

    /// Delivery attempt count, starting at 1.
    fn deliveries(&self) -> u64;

    /// Commit this message. Uncommitted messages are redelivered.
    async fn ack(self: Box<Self>) -> Result<(), TransportError>;
}

/// Durable pull subscription over a fixed set of subjects.
#[async_trait]
pub trait LogSubscription: Send {
    /// Fetch the next batch of deliveries, earliest uncommitted first.
    /// Returns an empty batch when nothing is pending.
    async fn fetch(
        &mut self,
        max_messages: usize,
    ) -> Result<Vec<Box<dyn Delivery>>, TransportError>;
}

/// Transport abstraction for a partitioned, replayable append log.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Append a message to a subject. Resolves once the log has stored it.
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> Result<PublishReceipt, TransportError>;

    /// Open a durable pull subscription filtered to the given subjects.
    /// Subscriptions sharing a durable name share their committed position.
    async fn pull_subscribe(
        &self,
        durable: &str,
        subjects: Vec<String>,
    ) -> Result<Box<dyn LogSubscription>, TransportError>;
}
