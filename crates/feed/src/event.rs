use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Envelope wrapping a raw feed frame for delivery.
///
/// Created at the moment a frame is received. The serde field names are the
/// durable-log wire format; `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub message: String,
    pub source: String,
    pub timestamp: i64,
}

impl FeedEvent {
    /// Wrap a frame received now.
    pub fn now(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}
