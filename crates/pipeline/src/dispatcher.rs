use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::decimal::parse_decimal;
use crate::frame::{classify, FeedFrame, TickerFields};
use crate::snapshot::TickerSnapshot;
use crate::store::TickerStore;

/// Result of dispatching one raw payload. Callers observe outcome values,
/// never errors: on the durable-log path `Failed` means "withhold the
/// ack", on the event-bus path it means "log and drop".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Persisted,
    Ignored,
    Failed(FailureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Unparsable JSON or a non-object root.
    Parse,
    /// The store rejected the insert.
    Store,
    /// Anything unexpected outside the store call.
    Internal,
}

impl DispatchOutcome {
    /// Stable label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Persisted => "persisted",
            DispatchOutcome::Ignored => "ignored",
            DispatchOutcome::Failed(FailureKind::Parse) => "failed-parse",
            DispatchOutcome::Failed(FailureKind::Store) => "failed-store",
            DispatchOutcome::Failed(FailureKind::Internal) => "failed-internal",
        }
    }
}

/// Classifies raw payloads and routes tickers to the store.
pub struct Dispatcher {
    store: Arc<dyn TickerStore>,
    exchange: String,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn TickerStore>, exchange: impl Into<String>) -> Self {
        Self {
            store,
            exchange: exchange.into(),
        }
    }

    /// Classify one payload and handle it. Never panics past this boundary
    /// and never returns an error; malformed input degrades to `Failed` or
    /// `Ignored` outcomes.
    pub async fn dispatch(&self, payload: &str) -> DispatchOutcome {
        let frame = match classify(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, payload = %preview(payload), "Dropping unparsable message");
                return DispatchOutcome::Failed(FailureKind::Parse);
            }
        };

        match frame {
            FeedFrame::Ticker(fields) => self.persist_ticker(fields).await,
            FeedFrame::Heartbeat => {
                debug!("Heartbeat received");
                DispatchOutcome::Ignored
            }
            FeedFrame::Subscriptions => {
                info!(payload = %preview(payload), "Subscription confirmed");
                DispatchOutcome::Ignored
            }
            FeedFrame::Error => {
                error!(payload = %preview(payload), "Feed reported an error");
                DispatchOutcome::Ignored
            }
            FeedFrame::Unknown(tag) => {
                debug!(tag = %tag, "Unhandled message type");
                DispatchOutcome::Ignored
            }
        }
    }

    async fn persist_ticker(&self, fields: TickerFields) -> DispatchOutcome {
        let snapshot = TickerSnapshot {
            id: None,
            observed_at: Utc::now(),
            symbol: fields.product_id,
            exchange: self.exchange.clone(),
            price: parse_decimal(fields.price.as_deref()),
            volume: parse_decimal(fields.volume_24h.as_deref()),
            bid: parse_decimal(fields.bid.as_deref()),
            ask: parse_decimal(fields.ask.as_deref()),
            high_24h: parse_decimal(fields.high_24h.as_deref()),
            low_24h: parse_decimal(fields.low_24h.as_deref()),
            open_24h: parse_decimal(fields.open_24h.as_deref()),
            raw_payload: fields.raw,
            created_at: None,
        };

        match self.store.insert(&snapshot).await {
            Ok(()) => {
                debug!(symbol = %snapshot.symbol, "Persisted ticker snapshot");
                DispatchOutcome::Persisted
            }
            Err(e) => {
                error!(error = %e, symbol = %snapshot.symbol, "Failed to persist ticker snapshot");
                DispatchOutcome::Failed(FailureKind::Store)
            }
        }
    }
}

/// First 200 chars of a payload for log lines.
fn preview(payload: &str) -> String {
    payload.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTickerStore;
    use rust_decimal::Decimal;

    fn dispatcher(store: &Arc<MemoryTickerStore>) -> Dispatcher {
        Dispatcher::new(Arc::clone(store) as Arc<dyn TickerStore>, "coinbase")
    }

    fn dec(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    #[tokio::test]
    async fn test_full_ticker_persists_exact_decimals() {
        let store = Arc::new(MemoryTickerStore::new());
        let payload = r#"{"type":"ticker","product_id":"ETH-USD","price":"3000.00","volume_24h":"500.25","bid":"2999.50","ask":"3000.50","high_24h":"3100.00","low_24h":"2900.00","open_24h":"2950.00"}"#;

        let outcome = dispatcher(&store).dispatch(payload).await;
        assert_eq!(outcome, DispatchOutcome::Persisted);

        let rows = store.rows().await;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.symbol, "ETH-USD");
        assert_eq!(row.exchange, "coinbase");
        assert_eq!(row.price, Some(dec("3000.00")));
        assert_eq!(row.volume, Some(dec("500.25")));
        assert_eq!(row.bid, Some(dec("2999.50")));
        assert_eq!(row.ask, Some(dec("3000.50")));
        assert_eq!(row.high_24h, Some(dec("3100.00")));
        assert_eq!(row.low_24h, Some(dec("2900.00")));
        assert_eq!(row.open_24h, Some(dec("2950.00")));
    }

    #[tokio::test]
    async fn test_partial_ticker_still_persists() {
        let store = Arc::new(MemoryTickerStore::new());
        let payload = r#"{"type":"ticker","product_id":"BTC-USD","price":"50000.00","volume_24h":null,"bid":"","ask":"null"}"#;

        let outcome = dispatcher(&store).dispatch(payload).await;
        assert_eq!(outcome, DispatchOutcome::Persisted);

        let rows = store.rows().await;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.price, Some(dec("50000.00")));
        assert_eq!(row.volume, None);
        assert_eq!(row.bid, None);
        assert_eq!(row.ask, None);
        assert_eq!(row.high_24h, None);
    }

    #[tokio::test]
    async fn test_malformed_field_nulls_only_that_field() {
        let store = Arc::new(MemoryTickerStore::new());
        let payload = r#"{"type":"ticker","product_id":"BTC-USD","price":"abc","bid":"49999.99"}"#;

        let outcome = dispatcher(&store).dispatch(payload).await;
        assert_eq!(outcome, DispatchOutcome::Persisted);

        let rows = store.rows().await;
        assert_eq!(rows[0].price, None);
        assert_eq!(rows[0].bid, Some(dec("49999.99")));
    }

    #[tokio::test]
    async fn test_raw_payload_is_kept() {
        let store = Arc::new(MemoryTickerStore::new());
        let payload = r#"{"type":"ticker","product_id":"BTC-USD","price":"1.00"}"#;

        dispatcher(&store).dispatch(payload).await;

        let rows = store.rows().await;
        let raw: serde_json::Value = serde_json::from_str(&rows[0].raw_payload).unwrap();
        assert_eq!(raw["type"], "ticker");
        assert_eq!(raw["product_id"], "BTC-USD");
        assert_eq!(raw["price"], "1.00");
    }

    #[tokio::test]
    async fn test_invalid_json_fails_parse_with_no_rows() {
        let store = Arc::new(MemoryTickerStore::new());

        let outcome = dispatcher(&store).dispatch("invalid json").await;
        assert_eq!(outcome, DispatchOutcome::Failed(FailureKind::Parse));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_non_object_root_fails_parse() {
        let store = Arc::new(MemoryTickerStore::new());

        let outcome = dispatcher(&store).dispatch(r#"[1,2,3]"#).await;
        assert_eq!(outcome, DispatchOutcome::Failed(FailureKind::Parse));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_control_frames_are_ignored_with_no_rows() {
        let store = Arc::new(MemoryTickerStore::new());
        let d = dispatcher(&store);

        for payload in [
            r#"{"type":"heartbeat","sequence":90}"#,
            r#"{"type":"subscriptions","channels":[]}"#,
            r#"{"type":"error","message":"rate limited"}"#,
            r#"{"type":"l2update","changes":[]}"#,
            r#"{"no_type_at_all":true}"#,
        ] {
            let outcome = d.dispatch(payload).await;
            assert_eq!(outcome, DispatchOutcome::Ignored, "payload: {}", payload);
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_failure_maps_to_failed_store() {
        let store = Arc::new(MemoryTickerStore::new());
        store.set_fail_inserts(true);
        let payload = r#"{"type":"ticker","product_id":"BTC-USD","price":"1.00"}"#;

        let outcome = dispatcher(&store).dispatch(payload).await;
        assert_eq!(outcome, DispatchOutcome::Failed(FailureKind::Store));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_redispatch_after_store_recovery_duplicates() {
        let store = Arc::new(MemoryTickerStore::new());
        let d = dispatcher(&store);
        let payload = r#"{"type":"ticker","product_id":"BTC-USD","price":"1.00"}"#;

        store.set_fail_inserts(true);
        assert_eq!(
            d.dispatch(payload).await,
            DispatchOutcome::Failed(FailureKind::Store)
        );

        store.set_fail_inserts(false);
        assert_eq!(d.dispatch(payload).await, DispatchOutcome::Persisted);
        assert_eq!(d.dispatch(payload).await, DispatchOutcome::Persisted);

        // Duplicates are expected: no natural key, no dedup
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(DispatchOutcome::Persisted.label(), "persisted");
        assert_eq!(DispatchOutcome::Ignored.label(), "ignored");
        assert_eq!(
            DispatchOutcome::Failed(FailureKind::Parse).label(),
            "failed-parse"
        );
    }
}
