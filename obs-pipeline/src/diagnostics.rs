//! Rate-limited "log at most once per id/source" diagnostics (spec §4.4, §7).

use parking_lot::Mutex;
use std::collections::HashSet;

/// Deduplicates repeated diagnostics keyed by `(source, kind, id)` so a misbehaving line that
/// repeats every poll doesn't flood the log.
#[derive(Default)]
pub struct Diagnostics {
    seen: Mutex<HashSet<(String, &'static str, String)>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `message` at `tracing::warn!` the first time this `(source, kind, id)` triple is
    /// seen; silently counts every later occurrence.
    pub fn warn_once(&self, source: &str, kind: &'static str, id: &str, message: &str) {
        let key = (source.to_owned(), kind, id.to_owned());
        let first_time = self.seen.lock().insert(key);
        if first_time {
            tracing::warn!(source, kind, id, "{message}");
        }
    }

    #[cfg(test)]
    fn seen_count(&self) -> usize {
        self.seen.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_triple_is_recorded_only_once() {
        let d = Diagnostics::new();
        d.warn_once("src-1", "unknown-data-item", "Xpos", "nope");
        d.warn_once("src-1", "unknown-data-item", "Xpos", "nope again");
        assert_eq!(d.seen_count(), 1);
    }

    #[test]
    fn distinct_ids_are_tracked_independently() {
        let d = Diagnostics::new();
        d.warn_once("src-1", "unknown-data-item", "Xpos", "nope");
        d.warn_once("src-1", "unknown-data-item", "Ypos", "nope");
        assert_eq!(d.seen_count(), 2);
    }
}
