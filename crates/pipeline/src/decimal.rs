use rust_decimal::Decimal;
use tracing::warn;

/// Parse a textual numeric field into an exact decimal.
///
/// Absent, empty, and the literal string `"null"` all mean "no value" on
/// this feed and map to `None` rather than zero or an error. A value that
/// fails to parse is logged and also maps to `None`, so one malformed field
/// never discards the record it belongs to.
pub fn parse_decimal(raw: Option<&str>) -> Option<Decimal> {
    let text = match raw {
        Some(t) if !t.is_empty() && t != "null" => t,
        _ => return None,
    };

    match text.parse::<Decimal>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(text, "Failed to parse decimal field");
            None
        }
    }
}
