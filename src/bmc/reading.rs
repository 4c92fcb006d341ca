//! Rotation bookkeeping for the live-reading cycle.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ReadingCycle {
    current_index: usize,
    in_flight: bool,
    last_refresh: Option<Instant>,
    staleness: Duration,
}

impl ReadingCycle {
    pub fn new(staleness: Duration) -> Self {
        Self { current_index: 0, in_flight: false, last_refresh: None, staleness }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    /// Whether the last complete pass is still inside the staleness window.
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.last_refresh
            .is_some_and(|at| now.saturating_duration_since(at) < self.staleness)
    }

    /// Try to start a pass. Fails while one is running or the cache is fresh.
    pub fn begin(&mut self, now: Instant) -> bool {
        if self.in_flight || self.is_fresh(now) {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Move past the current entry. Returns `true` when the pass is complete.
    pub fn advance(&mut self, len: usize, now: Instant) -> bool {
        if len == 0 {
            self.in_flight = false;
            return true;
        }
        let was_last = self.current_index + 1 >= len;
        self.current_index = (self.current_index + 1) % len;
        if was_last {
            self.in_flight = false;
            self.last_refresh = Some(now);
        }
        was_last
    }

    /// Stop the pass without marking it fresh; the index is kept.
    pub fn abort(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_walks_every_entry_then_goes_fresh() {
        let start = Instant::now();
        let mut cycle = ReadingCycle::new(Duration::from_secs(3));
        assert!(cycle.begin(start));
        assert!(!cycle.begin(start), "second trigger while in flight must be a no-op");

        assert!(!cycle.advance(3, start));
        assert!(!cycle.advance(3, start));
        assert!(cycle.advance(3, start));
        assert_eq!(cycle.current_index(), 0);
        assert!(!cycle.in_flight());

        assert!(!cycle.begin(start + Duration::from_secs(2)));
        assert!(cycle.begin(start + Duration::from_secs(3)));
    }

    #[test]
    fn abort_keeps_position_and_staleness() {
        let now = Instant::now();
        let mut cycle = ReadingCycle::new(Duration::from_secs(3));
        cycle.begin(now);
        cycle.advance(4, now);
        cycle.abort();
        assert_eq!(cycle.current_index(), 1);
        assert!(cycle.last_refresh().is_none());
        assert!(cycle.begin(now));
    }
}
