//! Request and message identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique, roughly sortable ID: `{prefix}-{millis}-{seq}`.
///
/// The sequence number is shared by every caller in the process, so two IDs
/// never collide even when generated within the same millisecond.
pub fn sequential_id(prefix: &str) -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}-{}-{}", prefix, millis, seq)
}
