//! tickflow-middleware: durable append-log abstractions
//!
//! Provides trait-based abstractions for a partitioned, replayable message
//! log with explicit per-message acknowledgment, with an in-memory
//! implementation for testing and a NATS JetStream implementation.

pub mod error;
pub mod memory;
pub mod nats;
pub mod transport;

pub use error::TransportError;
pub use memory::InMemoryTransport;
pub use nats::NatsTransport;
pub use transport::{Delivery, LogSubscription, PublishReceipt, Transport};
