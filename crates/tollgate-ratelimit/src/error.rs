use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Rate limiting errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Configuration error
    #[error("rate limit configuration error: {0}")]
    Config(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded ({window})")]
    Exceeded {
        /// Window that rejected the request
        window: RateWindow,
        /// Time until the window admits another request
        retry_after: Duration,
    },
}

/// Limit that rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateWindow {
    Burst,
    Minute,
    Hour,
    Day,
    Global,
}

impl RateWindow {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Burst => "burst",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
