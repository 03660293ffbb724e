use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("credentials rejected: {0}")]
    Unauthorized(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request limiter closed")]
    LimiterClosed,
    #[error("gave up waiting for request capacity")]
    NotAdmitted,
}

impl HostError {
    /// Whether repeating the same idempotent read may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            HostError::NotFound(_) => true,
            HostError::Api { status, .. } => *status >= 500,
            HostError::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(HostError::NotFound("ref".into()).is_retryable());
        assert!(HostError::Api {
            endpoint: "x".into(),
            status: 502,
            body: String::new()
        }
        .is_retryable());
        assert!(!HostError::Api {
            endpoint: "x".into(),
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!HostError::Unauthorized("bad token".into()).is_retryable());
        assert!(!HostError::Conflict("name taken".into()).is_retryable());
    }
}
