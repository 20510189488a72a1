//! Small shared utilities.

use chrono::Utc;

/// Generate an 8-character hex ID for database entities.
pub(crate) fn generate_entity_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let stamp = (duration.as_secs() as u32) ^ duration.subsec_nanos();
    format!("{:08x}", stamp)
}

/// Current time as unix seconds, the unit used by all lifecycle stamps.
pub(crate) fn unix_now() -> i64 {
    Utc::now().timestamp()
}
