//! Minimal time helpers shared across crates. Callers that need an
//! injectable clock (for deterministic tests) should pass timestamps in
//! explicitly rather than calling `now_unix` deep in a call chain.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix timestamp in seconds. Used for scanner `mtime` comparisons
/// and maintenance-lock bookkeeping, never for content hashing or ids.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A best-effort RFC3339-ish UTC timestamp string for human-readable logs
/// and lock files. Not used for any on-disk comparison logic.
pub fn now_iso8601() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("unix:{secs}")
}
