use std::{num::NonZeroU32, time::Duration};

use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
};
use tollgate_config::RequestRateLimit;

use crate::{RateLimitError, RateWindow, parse_duration};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide limiter shared by every tenant, backed by governor
pub struct GlobalLimiter {
    limiter: DirectLimiter,
    clock: DefaultClock,
}

impl GlobalLimiter {
    /// Allow `max_requests` per `window`, with the whole allowance available as a burst
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, RateLimitError> {
        if window.is_zero() {
            return Err(RateLimitError::Config("rate limit window must be > 0".to_owned()));
        }
        let burst = NonZeroU32::new(max_requests)
            .ok_or_else(|| RateLimitError::Config("max_requests must be > 0".to_owned()))?;

        let quota = Quota::with_period(window / burst.get())
            .ok_or_else(|| RateLimitError::Config("invalid rate limit period".to_owned()))?
            .allow_burst(burst);

        Ok(Self {
            limiter: RateLimiter::direct(quota),
            clock: DefaultClock::default(),
        })
    }

    pub fn from_config(config: &RequestRateLimit) -> Result<Self, RateLimitError> {
        Self::new(config.requests, parse_duration(&config.window)?)
    }

    /// Take one cell from the shared quota
    pub fn check(&self) -> Result<(), RateLimitError> {
        self.limiter.check().map_err(|not_until| RateLimitError::Exceeded {
            window: RateWindow::Global,
            retry_after: not_until.wait_time_from(self.clock.now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_after_allowance() {
        let limiter = GlobalLimiter::new(3, Duration::from_secs(3600)).unwrap();
        for _ in 0..3 {
            limiter.check().unwrap();
        }

        let err = limiter.check().unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded { window: RateWindow::Global, .. }));
    }

    #[test]
    fn zero_window_rejected() {
        assert!(GlobalLimiter::new(10, Duration::ZERO).is_err());
        assert!(GlobalLimiter::new(0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn parses_window_from_config() {
        let config = RequestRateLimit {
            requests: 100,
            window: "1m".to_owned(),
        };
        assert!(GlobalLimiter::from_config(&config).is_ok());

        let bad = RequestRateLimit {
            requests: 100,
            window: "whenever".to_owned(),
        };
        assert!(matches!(GlobalLimiter::from_config(&bad), Err(RateLimitError::Config(_))));
    }
}
