use tokio::select;
use tracing::{error, info};

use crate::error::FeedError;
use crate::event::FeedEvent;
use crate::traits::{Connector, Writer};

/// Runner pumps raw frames from a connector into a writer.
///
/// Each frame is wrapped into a [`FeedEvent`] at receipt. A write failure
/// drops that frame and keeps the pump running; delivery guarantees are the
/// writer's concern, not the pump's.
pub struct Runner<C: Connector, W: Writer> {
    source: String,
    connector: C,
    writer: W,
}

impl<C: Connector, W: Writer> Runner<C, W> {
    pub fn new(source: impl Into<String>, connector: C, writer: W) -> Self {
        Self {
            source: source.into(),
            connector,
            writer,
        }
    }

    /// Shared view of the connector's state, for health checks.
    pub fn connection(&self) -> crate::connection::ConnectionHandle {
        self.connector.connection()
    }

    /// Run the pump until shutdown or disconnect.
    pub async fn run(
        &mut self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), FeedError> {
        self.connector.connect().await?;
        info!(source = %self.source, "Connected to feed");

        let mut rx = self.connector.frames();

        loop {
            select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
                frame = rx.recv() => {
                    match frame {
                        Some(text) => {
                            let event = FeedEvent::now(text, &self.source);
                            if let Err(e) = self.writer.write(&event).await {
                                error!(error = %e, "Failed to hand off frame, dropping");
                            }
                        }
                        None => {
                            error!("Feed disconnected unexpectedly");
                            self.writer.close().await.ok();
                            return Err(FeedError::Disconnected("frame channel closed".to_string()));
                        }
                    }
                }
            }
        }

        self.writer.close().await.ok();
        self.connector.close().await?;
        Ok(())
    }
}
