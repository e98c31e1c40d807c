use thiserror::Error;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the object-store boundary.
///
/// Classification happens once, at the point of the store call; everything
/// downstream only inspects the variant. Only `Transient` participates in
/// the bounded retry loop — the remaining variants are terminal.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("bucket does not exist: {bucket}")]
    BucketNotFound { bucket: String },

    #[error("object does not exist: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("store deadline exceeded")]
    DeadlineExceeded,

    #[error("store request cancelled")]
    Cancelled,

    #[error("transient store failure: {reason}")]
    Transient { reason: String },
}

impl StoreError {
    /// Whether the bounded retry loop may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }

    /// Whether this error names an absent bucket or object.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::BucketNotFound { .. } | StoreError::ObjectNotFound { .. }
        )
    }

    /// HTTP status the range proxy maps this error to.
    pub fn proxy_status(&self) -> axum::http::StatusCode {
        if self.is_not_found() {
            axum::http::StatusCode::NOT_FOUND
        } else {
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ---------------------------------------------------------------------------
// Plain-text error responses
// ---------------------------------------------------------------------------

/// Build a plain-text error response.
///
/// The body is the message plus a trailing newline, matching the contract
/// the downstream assembly module and the existing test fixtures expect.
pub fn plain_error(status: axum::http::StatusCode, message: &str) -> axum::response::Response {
    use axum::response::IntoResponse;

    (
        status,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        format!("{message}\n"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_transient_is_retryable() {
        let err = StoreError::Transient {
            reason: "connection reset".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_terminal_errors_not_retryable() {
        let errs = [
            StoreError::BucketNotFound {
                bucket: "b".to_string(),
            },
            StoreError::ObjectNotFound {
                bucket: "b".to_string(),
                key: "k".to_string(),
            },
            StoreError::DeadlineExceeded,
            StoreError::Cancelled,
        ];
        for err in errs {
            assert!(!err.is_retryable(), "{err} should be terminal");
        }
    }

    #[test]
    fn test_proxy_status_mapping() {
        let not_found = StoreError::ObjectNotFound {
            bucket: "b".to_string(),
            key: "k".to_string(),
        };
        assert_eq!(not_found.proxy_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            StoreError::DeadlineExceeded.proxy_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
