// src/watch/dedup.rs

//! Coalescing of repeated events for the same task id.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Remembers task ids seen within a sliding window.
#[derive(Debug, Clone)]
pub struct RecentEvents {
    window: Duration,
    seen: HashMap<String, Instant>,
}

impl RecentEvents {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Record an event for `id` at `now`. Returns `true` if this is the first
    /// event for `id` within the window.
    pub fn observe(&mut self, id: &str, now: Instant) -> bool {
        self.prune(now);
        if self.seen.contains_key(id) {
            return false;
        }
        self.seen.insert(id.to_string(), now);
        true
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, at| now.saturating_duration_since(*at) < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_inside_window_are_coalesced() {
        let mut recent = RecentEvents::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(recent.observe("a", t0));
        assert!(!recent.observe("a", t0 + Duration::from_millis(500)));
        assert!(recent.observe("b", t0 + Duration::from_millis(500)));
    }

    #[test]
    fn entries_expire_after_window() {
        let mut recent = RecentEvents::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(recent.observe("a", t0));
        assert!(recent.observe("a", t0 + Duration::from_secs(3)));
        assert_eq!(recent.seen.len(), 1);
    }

    #[test]
    fn zero_window_never_coalesces() {
        let mut recent = RecentEvents::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(recent.observe("a", t0));
        assert!(recent.observe("a", t0));
    }
}
