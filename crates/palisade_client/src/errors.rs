// Copyright (c) Microsoft Corporation.

use std::time::Duration;

use http::StatusCode;

/// Failure of a client request.
///
/// Expected conditions (network outcomes, timeouts, open circuits) are
/// carried as values through the retry and fallback machinery rather than
/// panicking; only [`UnknownService`][ClientError::UnknownService] indicates
/// a programming error in the caller. The type is `Clone` so that callers
/// collapsed onto one deduplicated execution all observe the same failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The service identifier is not present in the registry. Never retried.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// The upstream answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http {
        /// The response status.
        status: StatusCode,
        /// The request address.
        url: String,
    },

    /// The request failed below the HTTP layer (connect, read, decode).
    #[error("transport failure: {message}")]
    Transport {
        /// Human-readable description of the failure.
        message: String,
    },

    /// The attempt exceeded its time budget.
    #[error("request timed out after {timeout:?}: {url}")]
    Timeout {
        /// The request address.
        url: String,
        /// The exceeded budget.
        timeout: Duration,
    },

    /// The circuit breaker refused the request and no cached fallback
    /// existed.
    #[error("circuit breaker open for service: {service}")]
    CircuitOpen {
        /// The guarded service.
        service: String,
    },

    /// Every configured proxy front-end failed.
    #[error("all proxies failed")]
    AllProxiesFailed,
}

impl ClientError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Authentication and not-found responses are deterministic, and an open
    /// circuit will not close because we ask again; everything else is worth
    /// another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UnknownService(_) | Self::CircuitOpen { .. } => false,
            Self::Http { status, .. } => !matches!(
                *status,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
            ),
            Self::Transport { .. } | Self::Timeout { .. } | Self::AllProxiesFailed => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_not_found_statuses_are_not_retryable() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN, StatusCode::NOT_FOUND] {
            let error = ClientError::Http {
                status,
                url: "https://example.com".to_owned(),
            };
            assert!(!error.is_retryable(), "{status} should not be retryable");
        }
    }

    #[test]
    fn server_errors_and_timeouts_are_retryable() {
        let server_error = ClientError::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            url: "https://example.com".to_owned(),
        };
        let timeout = ClientError::Timeout {
            url: "https://example.com".to_owned(),
            timeout: Duration::from_secs(10),
        };

        assert!(server_error.is_retryable());
        assert!(timeout.is_retryable());
    }

    #[test]
    fn circuit_open_and_unknown_service_are_terminal() {
        assert!(
            !ClientError::CircuitOpen {
                service: "gdelt".to_owned()
            }
            .is_retryable()
        );
        assert!(!ClientError::UnknownService("nope".to_owned()).is_retryable());
    }
}
