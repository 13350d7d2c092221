use thiserror::Error;

/// Errors surfaced by the relay transport and the layers above it.
///
/// The enum is `Clone` on purpose: a single in-flight request may be shared
/// by several coalesced callers, and every one of them must receive the
/// identical failure. Underlying transport errors are therefore captured as
/// strings rather than wrapped source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("relay rate limited the request (HTTP 429)")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("relay returned HTTP {code}")]
    Status { code: u16 },

    #[error("unrecognized response: {0}")]
    Malformed(String),

    #[error("command dispatch requires at least one target serial")]
    NoTargets,
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Timeout
        } else {
            RelayError::Transport(err.to_string())
        }
    }
}

impl RelayError {
    /// True for errors the backoff helper is allowed to retry.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RelayError::RateLimited)
    }
}
