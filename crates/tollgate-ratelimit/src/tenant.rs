use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tollgate_config::RateLimitConfig;

use crate::{GlobalLimiter, RateLimitError, RateWindow, SlidingWindow, TokenBucket, parse_duration};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(86_400);

/// Token bucket paired with an exact rolling count over the same period
///
/// The bucket smooths the rate; the rolling count caps what any window of
/// length `period` can admit, which a refilling bucket alone does not.
struct Limit {
    window: RateWindow,
    bucket: TokenBucket,
    rolling: SlidingWindow,
}

impl Limit {
    fn new(window: RateWindow, capacity: u32, period: Duration, now: Instant) -> Result<Self, RateLimitError> {
        if capacity == 0 {
            return Err(RateLimitError::Config(format!("per_{window} must be > 0")));
        }
        Ok(Self {
            window,
            bucket: TokenBucket::new(capacity, period, now),
            rolling: SlidingWindow::new(capacity, period),
        })
    }

    fn admits(&mut self, now: Instant) -> bool {
        // Evaluate both so each side prunes and refills
        let bucket = self.bucket.peek(now);
        let rolling = self.rolling.has_room(now);
        bucket && rolling
    }

    fn retry_after(&mut self, now: Instant) -> Duration {
        self.bucket.retry_after(now).max(self.rolling.retry_after(now))
    }

    fn record(&mut self, now: Instant) {
        self.bucket.consume(now);
        self.rolling.record(now);
    }
}

struct Limits {
    burst: SlidingWindow,
    windows: [Limit; 3],
}

/// Rate-limit state for one tenant
///
/// All checks and the final consumption happen under one lock, so
/// concurrent requests for the same tenant cannot both take the last token.
pub struct TenantLimiter {
    limits: Mutex<Limits>,
}

impl TenantLimiter {
    pub fn new(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        Self::new_at(config, Instant::now())
    }

    /// Limiter whose buckets start full at `now`
    pub fn new_at(config: &RateLimitConfig, now: Instant) -> Result<Self, RateLimitError> {
        let burst_window = parse_duration(&config.burst_window)?;
        if burst_window.is_zero() {
            return Err(RateLimitError::Config("burst window must be > 0".to_owned()));
        }
        if config.burst == 0 {
            return Err(RateLimitError::Config("burst must be > 0".to_owned()));
        }

        Ok(Self {
            limits: Mutex::new(Limits {
                burst: SlidingWindow::new(config.burst, burst_window),
                windows: [
                    Limit::new(RateWindow::Minute, config.per_minute, MINUTE, now)?,
                    Limit::new(RateWindow::Hour, config.per_hour, HOUR, now)?,
                    Limit::new(RateWindow::Day, config.per_day, DAY, now)?,
                ],
            }),
        })
    }

    /// Admit one request now
    pub fn try_acquire(&self, global: Option<&GlobalLimiter>) -> Result<(), RateLimitError> {
        self.try_acquire_at(Instant::now(), global)
    }

    /// Admit one request at `now`
    ///
    /// Succeeds only if the burst window, all three windows, and the global
    /// limiter (when given) admit it. On rejection no tenant state changes.
    pub fn try_acquire_at(&self, now: Instant, global: Option<&GlobalLimiter>) -> Result<(), RateLimitError> {
        let mut guard = self.limits.lock().unwrap_or_else(PoisonError::into_inner);
        let limits = &mut *guard;

        if !limits.burst.has_room(now) {
            let retry_after = limits.burst.retry_after(now);
            tracing::debug!(window = "burst", retry_after = ?retry_after, "burst window full");
            return Err(RateLimitError::Exceeded {
                window: RateWindow::Burst,
                retry_after,
            });
        }

        for limit in &mut limits.windows {
            if !limit.admits(now) {
                let retry_after = limit.retry_after(now);
                tracing::debug!(window = limit.window.as_str(), retry_after = ?retry_after, "window exhausted");
                return Err(RateLimitError::Exceeded {
                    window: limit.window,
                    retry_after,
                });
            }
        }

        if let Some(global) = global {
            global.check()?;
        }

        limits.burst.record(now);
        for limit in &mut limits.windows {
            limit.record(now);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(per_minute: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            per_minute,
            burst,
            ..RateLimitConfig::default()
        }
    }

    #[test]
    fn eleventh_request_in_a_minute_is_rejected() {
        let start = Instant::now();
        let limiter = TenantLimiter::new_at(&config(10, 20), start).unwrap();

        for i in 0..10 {
            limiter.try_acquire_at(start + Duration::from_millis(i * 100), None).unwrap();
        }

        let err = limiter.try_acquire_at(start + Duration::from_secs(1), None).unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded { window: RateWindow::Minute, .. }));
    }

    #[test]
    fn burst_window_rejects_first() {
        let start = Instant::now();
        let limiter = TenantLimiter::new_at(&config(100, 3), start).unwrap();

        for _ in 0..3 {
            limiter.try_acquire_at(start, None).unwrap();
        }
        let err = limiter.try_acquire_at(start + Duration::from_secs(1), None).unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded { window: RateWindow::Burst, .. }));

        // Burst window slides after 10s
        limiter.try_acquire_at(start + Duration::from_secs(10), None).unwrap();
    }

    #[test]
    fn rejection_consumes_nothing() {
        let start = Instant::now();
        let limiter = TenantLimiter::new_at(&config(2, 20), start).unwrap();
        let global = GlobalLimiter::new(1, Duration::from_secs(3600)).unwrap();

        limiter.try_acquire_at(start, Some(&global)).unwrap();

        // Global quota is spent; tenant buckets must keep their remaining token
        let err = limiter.try_acquire_at(start, Some(&global)).unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded { window: RateWindow::Global, .. }));
        limiter.try_acquire_at(start, None).unwrap();
        assert!(limiter.try_acquire_at(start, None).is_err());
    }

    #[test]
    fn tenant_rejection_does_not_spend_global_quota() {
        let start = Instant::now();
        let limiter = TenantLimiter::new_at(&config(1, 20), start).unwrap();
        let global = GlobalLimiter::new(2, Duration::from_secs(3600)).unwrap();

        limiter.try_acquire_at(start, Some(&global)).unwrap();
        assert!(limiter.try_acquire_at(start, Some(&global)).is_err());

        // One global cell must still be left
        global.check().unwrap();
    }

    #[test]
    fn minute_window_holds_until_oldest_request_expires() {
        let start = Instant::now();
        let limiter = TenantLimiter::new_at(&config(10, 20), start).unwrap();
        for _ in 0..10 {
            limiter.try_acquire_at(start, None).unwrap();
        }

        // Bucket has refilled a token by 7s, but the rolling minute is still full
        let err = limiter.try_acquire_at(start + Duration::from_secs(7), None).unwrap_err();
        let RateLimitError::Exceeded { window, retry_after } = err else {
            panic!("expected a window rejection, got {err:?}");
        };
        assert_eq!(window, RateWindow::Minute);
        assert_eq!(retry_after, Duration::from_secs(53));

        limiter.try_acquire_at(start + Duration::from_secs(60), None).unwrap();
    }

    #[test]
    fn rolling_minute_never_admits_more_than_capacity() {
        let start = Instant::now();
        let limiter = TenantLimiter::new_at(&config(10, 100), start).unwrap();

        // A request every 100ms for two minutes
        let admitted: Vec<Duration> = (0..1200u64)
            .map(|i| Duration::from_millis(i * 100))
            .filter(|offset| limiter.try_acquire_at(start + *offset, None).is_ok())
            .collect();

        assert!(!admitted.is_empty());
        for (i, first) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|later| **later - *first < MINUTE)
                .count();
            assert!(in_window <= 10, "{in_window} admitted in the minute after {first:?}");
        }
    }

    #[test]
    fn zero_capacity_is_a_config_error() {
        for config in [
            RateLimitConfig {
                per_minute: 0,
                ..RateLimitConfig::default()
            },
            RateLimitConfig {
                per_hour: 0,
                ..RateLimitConfig::default()
            },
            RateLimitConfig {
                per_day: 0,
                ..RateLimitConfig::default()
            },
            RateLimitConfig {
                burst: 0,
                ..RateLimitConfig::default()
            },
        ] {
            assert!(matches!(TenantLimiter::new(&config), Err(RateLimitError::Config(_))));
        }
    }

    #[test]
    fn invalid_burst_window_rejected() {
        let config = RateLimitConfig {
            burst_window: "0s".to_owned(),
            ..RateLimitConfig::default()
        };
        assert!(TenantLimiter::new(&config).is_err());
    }
}
