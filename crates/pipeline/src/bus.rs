//! In-process event bus path
//!
//! Same-process delivery from feed reception to the dispatcher, decoupled
//! by a broadcast channel. This path is at-most-once: publish never blocks
//! the feed, a lagged subscriber drops messages, and a failed dispatch is
//! logged and dropped with no retry.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::metrics;
use tickflow_feed::FeedEvent;

const BUS_BUFFER_SIZE: usize = 1024;

const PATH_LABEL: &str = "bus";

/// In-process publish/subscribe channel for feed envelopes.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_BUFFER_SIZE);
        Self { tx }
    }

    /// Non-blocking publish. An envelope with no live subscriber is
    /// silently dropped, like any missed broadcast.
    pub fn publish(&self, event: FeedEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscribe the dispatcher to the bus: one dispatch per received
/// envelope, failures logged and dropped.
pub fn spawn_dispatch_task(
    bus: &EventBus,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        let outcome = dispatcher.dispatch(&event.message).await;
                        metrics::record_dispatch(PATH_LABEL, outcome.label());
                        if let DispatchOutcome::Failed(kind) = outcome {
                            warn!(
                                ?kind,
                                source = %event.source,
                                "Direct-path dispatch failed, message dropped"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event bus subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        info!("Event bus dispatch task stopped");
    })
}
