use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("gateway returned {status}: {body}")]
    Api {
        status: StatusCode,
        body: String,
        retry_after_secs: Option<u64>,
    },
    #[error("transfer cancelled")]
    Cancelled,
    #[error("content integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("part {index} failed after {attempts} attempts: {last_error}")]
    PartExhausted {
        index: u32,
        attempts: u32,
        last_error: String,
    },
    #[error("multipart session was not opened by the gateway")]
    MissingSession,
}

/// Coarse classification used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

impl StorageError {
    pub fn classification(&self) -> ErrorClass {
        match self {
            StorageError::Request(err) => {
                if err.is_timeout() || err.is_connect() || err.is_request() {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
            StorageError::Api { status, .. } => classify_status(*status),
            StorageError::Io(_) => ErrorClass::Transient,
            // Session state on the server cannot be trusted after these; the
            // caller restarts the transfer from scratch.
            StorageError::IntegrityMismatch { .. } => ErrorClass::Transient,
            StorageError::PartExhausted { .. } => ErrorClass::Transient,
            StorageError::Url(_) | StorageError::Cancelled | StorageError::MissingSession => {
                ErrorClass::Permanent
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            ErrorClass::RateLimit | ErrorClass::Transient
        )
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            StorageError::Api {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

fn classify_status(status: StatusCode) -> ErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_are_not_retried() {
        let err = StorageError::Api {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
            retry_after_secs: None,
        };
        assert_eq!(err.classification(), ErrorClass::Auth);
        assert!(!err.is_retryable());
    }

    #[test]
    fn rate_limit_is_retryable_and_carries_delay() {
        let err = StorageError::Api {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
            retry_after_secs: Some(12),
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_after_secs(), Some(12));
    }

    #[test]
    fn server_errors_are_transient() {
        let err = StorageError::Api {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
            retry_after_secs: None,
        };
        assert_eq!(err.classification(), ErrorClass::Transient);
    }

    #[test]
    fn cancellation_is_terminal() {
        assert!(!StorageError::Cancelled.is_retryable());
    }
}
