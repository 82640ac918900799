//! Small shared helpers.

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Render a timestamp as RFC 3339 for headers and user-facing messages.
pub fn rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.to_string())
}
