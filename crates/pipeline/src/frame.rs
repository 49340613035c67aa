//! Feed frame classification
//!
//! The raw `type` tag is decoded exactly once, here at the ingress
//! boundary, into a closed enum. Everything downstream branches on the
//! enum; nothing re-compares the tag string.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("root is not an object")]
    NotAnObject,
}

/// A classified feed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    Ticker(TickerFields),
    Heartbeat,
    Subscriptions,
    Error,
    Unknown(String),
}

/// Raw field texts of a ticker frame. Decimal coercion happens later,
/// per field, so one bad field cannot reject the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerFields {
    pub product_id: String,
    pub price: Option<String>,
    pub volume_24h: Option<String>,
    pub bid: Option<String>,
    pub ask: Option<String>,
    pub high_24h: Option<String>,
    pub low_24h: Option<String>,
    pub open_24h: Option<String>,
    /// Normalized JSON text of the whole frame, kept verbatim for audit
    /// and replay.
    pub raw: String,
}

/// Field text with the feed's leniency: JSON null and absent both mean
/// "no value"; a number is taken by its textual form.
fn field_text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Classify a raw payload into a [`FeedFrame`].
///
/// Unparsable JSON and non-object roots are the only errors; an
/// unrecognized tag is a valid frame (`Unknown`), not an error.
pub fn classify(payload: &str) -> Result<FeedFrame, ClassifyError> {
    let value: Value = serde_json::from_str(payload)?;
    let obj = match value {
        Value::Object(obj) => obj,
        _ => return Err(ClassifyError::NotAnObject),
    };

    let tag = obj
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let frame = match tag.as_str() {
        "ticker" => {
            let fields = TickerFields {
                product_id: field_text(&obj, "product_id").unwrap_or_default(),
                price: field_text(&obj, "price"),
                volume_24h: field_text(&obj, "volume_24h"),
                bid: field_text(&obj, "bid"),
                ask: field_text(&obj, "ask"),
                high_24h: field_text(&obj, "high_24h"),
                low_24h: field_text(&obj, "low_24h"),
                open_24h: field_text(&obj, "open_24h"),
                raw: Value::Object(obj).to_string(),
            };
            FeedFrame::Ticker(fields)
        }
        "heartbeat" => FeedFrame::Heartbeat,
        "subscriptions" => FeedFrame::Subscriptions,
        "error" => FeedFrame::Error,
        _ => FeedFrame::Unknown(tag),
    };

    Ok(frame)
}
