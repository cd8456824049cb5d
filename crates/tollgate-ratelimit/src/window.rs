use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Exact sliding-window counter over a short window
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    limit: usize,
    window: Duration,
    admitted: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(limit: u32, window: Duration) -> Self {
        let limit = limit as usize;
        Self {
            limit,
            window,
            admitted: VecDeque::with_capacity(limit.min(1024)),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.admitted.front() {
            if now.saturating_duration_since(*oldest) < self.window {
                break;
            }
            self.admitted.pop_front();
        }
    }

    /// Whether another request fits in the window ending at `now`
    pub fn has_room(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.admitted.len() < self.limit
    }

    /// Count a request at `now`
    pub fn record(&mut self, now: Instant) {
        self.admitted.push_back(now);
    }

    /// Time until the oldest admitted request leaves the window
    pub fn retry_after(&mut self, now: Instant) -> Duration {
        self.prune(now);
        if self.admitted.len() < self.limit {
            return Duration::ZERO;
        }
        self.admitted
            .front()
            .map_or(Duration::ZERO, |oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_requests_within_window() {
        let start = Instant::now();
        let mut window = SlidingWindow::new(2, Duration::from_secs(10));

        for offset in [0, 1] {
            let now = start + Duration::from_secs(offset);
            assert!(window.has_room(now));
            window.record(now);
        }
        assert!(!window.has_room(start + Duration::from_secs(9)));
        assert_eq!(window.retry_after(start + Duration::from_secs(9)), Duration::from_secs(1));

        // First request slides out at t=10
        assert!(window.has_room(start + Duration::from_secs(10)));
    }
}
