use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::connection::ConnectionHandle;
use crate::error::{FeedError, WriterError};
use crate::event::FeedEvent;

/// Connector trait for feed sources (WebSocket, replay files, mocks).
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish the connection and subscribe. Safe to call while already
    /// connecting or connected; those calls are no-ops.
    async fn connect(&mut self) -> Result<(), FeedError>;

    /// Get receiver for raw incoming frames.
    fn frames(&mut self) -> mpsc::Receiver<String>;

    /// Close the connection. Safe to call while already disconnected.
    async fn close(&mut self) -> Result<(), FeedError>;

    /// Shared view of the connection state.
    fn connection(&self) -> ConnectionHandle;
}

/// Writer trait for frame destinations.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Hand one received envelope to the destination.
    async fn write(&mut self, event: &FeedEvent) -> Result<(), WriterError>;

    /// Close and flush the writer.
    async fn close(&mut self) -> Result<(), WriterError>;
}
