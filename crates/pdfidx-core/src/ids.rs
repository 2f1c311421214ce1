//! Unique suffixes for the page store's write-then-rename staging
//! directories (`pages/.tmp-{id}/`), so two concurrent first-references to
//! distinct pages never stage into the same temp path.

use std::sync::atomic::{AtomicU64, Ordering};

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A name unique within this process: the pid paired with a monotonic
/// counter. Not meant to be globally unique or to survive a restart — the
/// directory it names is removed before the function that created it
/// returns, successful or not.
pub fn new_local_id() -> String {
    let pid = std::process::id();
    let seq = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{pid:x}-{seq:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_unique_within_a_process() {
        let ids: Vec<String> = (0..128).map(|_| new_local_id()).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
    }
}
