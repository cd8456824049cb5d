use std::time::{Duration, Instant};

/// Continuously refilled token bucket
///
/// Refill happens lazily on every access based on elapsed time.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    updated_at: Instant,
}

impl TokenBucket {
    /// Full bucket holding `capacity` tokens, refilled evenly over `period`
    pub fn new(capacity: u32, period: Duration, now: Instant) -> Self {
        let capacity = f64::from(capacity);
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / period.as_secs_f64().max(f64::MIN_POSITIVE),
            updated_at: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.updated_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.updated_at = self.updated_at.max(now);
    }

    /// Whether one token is available at `now`, without consuming it
    pub fn peek(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.tokens >= 1.0
    }

    /// Take one token if available
    pub fn consume(&mut self, now: Instant) -> bool {
        if !self.peek(now) {
            return false;
        }
        self.tokens -= 1.0;
        true
    }

    /// Time until one token is available
    pub fn retry_after(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if self.refill_per_sec <= 0.0 {
            return Duration::MAX;
        }
        Duration::try_from_secs_f64((1.0 - self.tokens) / self.refill_per_sec).unwrap_or(Duration::MAX)
    }

    /// Tokens currently available (refilled to `now`)
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_then_refills() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2, Duration::from_secs(60), start);

        assert!(bucket.consume(start));
        assert!(bucket.consume(start));
        assert!(!bucket.consume(start));

        // One token per 30s
        assert!(!bucket.consume(start + Duration::from_secs(29)));
        assert!(bucket.consume(start + Duration::from_secs(31)));
    }

    #[test]
    fn never_exceeds_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(3, Duration::from_secs(1), start);
        assert!((bucket.available(start + Duration::from_secs(3600)) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn peek_does_not_consume() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(1, Duration::from_secs(60), start);
        assert!(bucket.peek(start));
        assert!(bucket.peek(start));
        assert!(bucket.consume(start));
        assert!(!bucket.peek(start));
    }

    #[test]
    fn retry_after_reflects_refill_rate() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(1, Duration::from_secs(60), start);
        bucket.consume(start);

        let wait = bucket.retry_after(start + Duration::from_secs(15));
        assert!((wait.as_secs_f64() - 45.0).abs() < 1e-6);
    }

    #[test]
    fn empty_bucket_never_refills() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(0, Duration::from_secs(60), start);

        assert!(!bucket.consume(start + Duration::from_secs(3600)));
        assert_eq!(bucket.retry_after(start), Duration::MAX);
    }
}
