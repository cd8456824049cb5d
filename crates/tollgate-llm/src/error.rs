use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Body phrases upstream providers use when a prompt exceeds the context window
static OVERFLOW_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)context[_ ]length[_ ]exceeded|maximum context|context window|too many tokens|prompt is too long|input is too long|request too large|reduce the length",
    )
    .expect("valid overflow regex")
});

/// Errors that can occur while executing a request
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Upstream returned a non-success status
    #[error("upstream returned {status}: {body}")]
    Http { status: u16, body: String },

    /// Upstream rejected the prompt as larger than the model's context window
    #[error("context overflow ({status}): {body}")]
    ContextOverflow { status: u16, body: String },

    /// No response within the configured timeout
    #[error("upstream timed out: {0}")]
    Timeout(String),

    /// Connection or protocol failure before a status was received
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body could not be interpreted
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    /// Prompt compressor failed to shorten the prompt
    #[error("compression failed: {0}")]
    Compression(String),
}

impl LlmError {
    /// Whether the same payload may succeed on another attempt
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Http { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            Self::ContextOverflow { .. } | Self::InvalidResponse(_) | Self::Compression(_) => false,
        }
    }

    /// Whether a shortened prompt may succeed
    pub const fn is_context_overflow(&self) -> bool {
        matches!(self, Self::ContextOverflow { .. })
    }

    /// Machine-readable error code
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Http { .. } | Self::InvalidResponse(_) | Self::Compression(_) => "upstream_error",
            Self::ContextOverflow { .. } => "context_overflow",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport_error",
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Classify a non-success upstream response
///
/// Overflow is only reported for 400/413/422 responses whose body carries a
/// known overflow phrase; everything else stays a plain HTTP error.
pub fn classify_http(status: u16, body: impl Into<String>) -> LlmError {
    let body = body.into();
    if matches!(status, 400 | 413 | 422) && OVERFLOW_MARKERS.is_match(&body) {
        LlmError::ContextOverflow { status, body }
    } else {
        LlmError::Http { status, body }
    }
}
