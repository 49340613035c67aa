use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// One persisted observation of an exchange ticker.
///
/// `symbol` and `exchange` are always populated; every numeric field may
/// legitimately be absent without blocking persistence. Rows are
/// insert-only: the store assigns `id`, and defaults `created_at` to the
/// write time when unset.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSnapshot {
    pub id: Option<i64>,
    pub observed_at: DateTime<Utc>,
    pub symbol: String,
    pub exchange: String,
    pub price: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub high_24h: Option<Decimal>,
    pub low_24h: Option<Decimal>,
    pub open_24h: Option<Decimal>,
    /// Verbatim JSON text of the classified ticker frame, for audit and
    /// downstream reprocessing.
    pub raw_payload: String,
    pub created_at: Option<DateTime<Utc>>,
}
