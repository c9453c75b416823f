//! Error types for upstream fetching and snapshot capture

use pointscope_core::Snapshot;
use pointscope_storage::StoreError;
use thiserror::Error;

/// Failure of a single upstream request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Upstream is cold-starting (headless browser, serverless function)
    #[error("Upstream warming up: {0}")]
    WarmingUp(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Expected field or program missing from an otherwise successful response
    #[error("Response shape changed: {0}")]
    ShapeChanged(String),
}

impl SourceError {
    /// Timeouts, network failures, warmup signals and 5xx/429 statuses
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::WarmingUp(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::NotFound(_) | Self::ShapeChanged(_) => false,
        }
    }

    /// Map a non-success HTTP status and its body
    pub fn from_status(status: u16, body: &str) -> Self {
        let message: String = body.chars().take(200).collect();
        if status == 404 {
            Self::NotFound(message)
        } else if status == 503 || body.to_ascii_lowercase().contains("warming up") {
            Self::WarmingUp(message)
        } else {
            Self::Status { status, message }
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::ShapeChanged(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// A request that failed for good, with the number of attempts spent on it
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: SourceError,
}

/// Errors that abort a capture
#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    /// Upstream unreachable or non-success after exhausting retries
    #[error("{upstream} source unavailable after {attempts} attempt(s): {error}")]
    UpstreamUnavailable {
        upstream: &'static str,
        attempts: u32,
        error: SourceError,
    },

    /// Upstream answered but without the expected data
    #[error("{upstream} response shape changed: {detail}")]
    UpstreamShapeChanged {
        upstream: &'static str,
        detail: String,
    },

    /// Store rejected the append; the computed snapshot is kept for resubmission
    #[error("Persistence failed: {reason}")]
    PersistenceFailure {
        snapshot: Box<Snapshot>,
        reason: StoreError,
    },
}

impl CaptureError {
    pub(crate) fn from_retry(upstream: &'static str, failure: RetryFailure) -> Self {
        match failure.error {
            SourceError::ShapeChanged(detail) => Self::UpstreamShapeChanged { upstream, detail },
            SourceError::NotFound(detail) => Self::UpstreamShapeChanged {
                upstream,
                detail: format!("not found: {detail}"),
            },
            error => Self::UpstreamUnavailable {
                upstream,
                attempts: failure.attempts,
                error,
            },
        }
    }

    /// Process exit status distinguishing transient from structural failures
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UpstreamUnavailable { .. } => 2,
            Self::UpstreamShapeChanged { .. } => 3,
            Self::PersistenceFailure { .. } => 4,
        }
    }

    /// Worth retrying the whole capture later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::PersistenceFailure { .. }
        )
    }

    /// Snapshot that was computed but not stored
    pub fn unsaved_snapshot(&self) -> Option<&Snapshot> {
        match self {
            Self::PersistenceFailure { snapshot, .. } => Some(&**snapshot),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SourceError::Timeout("t".into()).is_retryable());
        assert!(SourceError::Network("n".into()).is_retryable());
        assert!(SourceError::WarmingUp("w".into()).is_retryable());
        assert!(SourceError::from_status(502, "bad gateway").is_retryable());
        assert!(!SourceError::from_status(404, "").is_retryable());
        assert!(!SourceError::from_status(400, "bad request").is_retryable());
        assert!(!SourceError::ShapeChanged("x".into()).is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            SourceError::from_status(404, "missing"),
            SourceError::NotFound(_)
        ));
        assert!(matches!(
            SourceError::from_status(503, ""),
            SourceError::WarmingUp(_)
        ));
        assert!(matches!(
            SourceError::from_status(500, "Service is Warming Up, retry"),
            SourceError::WarmingUp(_)
        ));
        assert!(matches!(
            SourceError::from_status(500, "boom"),
            SourceError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn test_exit_codes() {
        let unavailable = CaptureError::from_retry(
            "tvl",
            RetryFailure {
                attempts: 4,
                error: SourceError::Timeout("t".into()),
            },
        );
        assert_eq!(unavailable.exit_code(), 2);
        assert!(unavailable.is_transient());

        let shape = CaptureError::from_retry(
            "tvl",
            RetryFailure {
                attempts: 1,
                error: SourceError::ShapeChanged("markets missing".into()),
            },
        );
        assert_eq!(shape.exit_code(), 3);
        assert!(!shape.is_transient());

        let persist = CaptureError::PersistenceFailure {
            snapshot: Box::new(Snapshot::from_figures(0, 0.0, 0.0, 0.0)),
            reason: StoreError::Unauthorized,
        };
        assert_eq!(persist.exit_code(), 4);
        assert!(persist.unsaved_snapshot().is_some());
    }
}
