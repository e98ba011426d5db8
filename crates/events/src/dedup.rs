//! Short-window event deduplication keyed by correlation id.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(5 * 60);
const RETAIN: Duration = Duration::from_secs(10 * 60);

/// Tracks recently published correlation ids.
///
/// Probes take the read lock; marking takes the write lock and sweeps entries
/// past the retention horizon so the map stays bounded.
pub struct DedupWindow {
    window: Duration,
    retain: Duration,
    seen: RwLock<HashMap<String, Instant>>,
}

impl DedupWindow {
    pub fn new() -> Self {
        Self::with_limits(WINDOW, RETAIN)
    }

    fn with_limits(window: Duration, retain: Duration) -> Self {
        Self {
            window,
            retain,
            seen: RwLock::new(HashMap::new()),
        }
    }

    /// Whether an event with this correlation id was published inside the
    /// dedup window.
    pub fn is_duplicate(&self, correlation_id: &str) -> bool {
        self.is_duplicate_at(correlation_id, Instant::now())
    }

    /// Record a successful publish for this correlation id.
    pub fn mark(&self, correlation_id: &str) {
        self.mark_at(correlation_id, Instant::now());
    }

    fn is_duplicate_at(&self, correlation_id: &str, now: Instant) -> bool {
        let seen = self
            .seen
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match seen.get(correlation_id) {
            Some(at) => now.duration_since(*at) < self.window,
            None => false,
        }
    }

    fn mark_at(&self, correlation_id: &str, now: Instant) {
        let mut seen = self
            .seen
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let retain = self.retain;
        seen.retain(|_, at| now.duration_since(*at) < retain);
        seen.insert(correlation_id.to_string(), now);
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_id_is_not_a_duplicate() {
        let dedup = DedupWindow::new();
        assert!(!dedup.is_duplicate("c1"));
    }

    #[test]
    fn marked_id_is_a_duplicate_inside_the_window() {
        let dedup = DedupWindow::new();
        dedup.mark("c1");
        assert!(dedup.is_duplicate("c1"));
        assert!(!dedup.is_duplicate("c2"));
    }

    #[test]
    fn duplicate_expires_after_the_window() {
        let dedup = DedupWindow::with_limits(Duration::from_secs(300), Duration::from_secs(600));
        let start = Instant::now();
        dedup.mark_at("c1", start);
        assert!(dedup.is_duplicate_at("c1", start + Duration::from_secs(299)));
        assert!(!dedup.is_duplicate_at("c1", start + Duration::from_secs(301)));
    }

    #[test]
    fn sweep_drops_entries_past_retention() {
        let dedup = DedupWindow::with_limits(Duration::from_secs(300), Duration::from_secs(600));
        let start = Instant::now();
        dedup.mark_at("old", start);
        dedup.mark_at("new", start + Duration::from_secs(601));
        let seen = dedup.seen.read().unwrap();
        assert!(!seen.contains_key("old"));
        assert!(seen.contains_key("new"));
    }
}
