//! Error taxonomy for the request-processing core.
//!
//! Every stage of the pipeline maps its own failures onto exactly one of
//! these variants before the error reaches the response boundary. Nothing
//! below this taxonomy is ever surfaced to a client.

use thiserror::Error;

/// Errors produced by the request-processing core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed inbound request. Not retryable.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The connection pool could not supply a connection before the
    /// deadline. Transient; clients may retry with backoff.
    #[error("connection pool exhausted after {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    /// The per-request deadline elapsed before the pipeline finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The downstream operation failed. Surfaced to the client, never
    /// retried automatically by the core.
    #[error("upstream operation failed: {0}")]
    Upstream(String),

    /// Encoding fault or unexpected internal failure. Logged; a generic
    /// response is returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// HTTP-style status code for the response boundary.
    pub fn status(&self) -> u16 {
        match self {
            CoreError::BadRequest(_) => 400,
            CoreError::PoolExhausted { .. } => 503,
            CoreError::DeadlineExceeded => 503,
            CoreError::Upstream(_) => 502,
            CoreError::Internal(_) => 500,
        }
    }

    /// Stable lowercase kind, used as a metric/log tag.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::BadRequest(_) => "bad_request",
            CoreError::PoolExhausted { .. } => "pool_exhausted",
            CoreError::DeadlineExceeded => "deadline_exceeded",
            CoreError::Upstream(_) => "upstream_error",
            CoreError::Internal(_) => "internal_error",
        }
    }

    /// Whether a client may reasonably retry the request with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::PoolExhausted { .. } | CoreError::DeadlineExceeded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(CoreError::BadRequest("x".into()).status(), 400);
        assert_eq!(CoreError::PoolExhausted { waited_ms: 10 }.status(), 503);
        assert_eq!(CoreError::DeadlineExceeded.status(), 503);
        assert_eq!(CoreError::Upstream("x".into()).status(), 502);
        assert_eq!(CoreError::Internal("x".into()).status(), 500);
    }

    #[test]
    fn test_retryable() {
        assert!(CoreError::PoolExhausted { waited_ms: 0 }.is_retryable());
        assert!(CoreError::DeadlineExceeded.is_retryable());
        assert!(!CoreError::BadRequest("x".into()).is_retryable());
        assert!(!CoreError::Upstream("x".into()).is_retryable());
    }
}
