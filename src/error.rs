//! Error types for the collector.
//!
//! Every failure mode of the pipeline maps to exactly one variant here, so
//! callers can classify errors into metric labels and process exit codes
//! without string matching.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur anywhere in the collector pipeline.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Missing or invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Source credentials were rejected
    #[error("source authentication failed: {0}")]
    SourceAuth(String),

    /// Source signalled throttling, optionally with a suggested wait
    #[error("source rate limited: {message}")]
    SourceRateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Timeout or 5xx-class response from the source
    #[error("transient source error: {0}")]
    SourceTransient(String),

    /// Malformed or otherwise unusable source response
    #[error("fatal source error: {0}")]
    SourceFatal(String),

    /// Dedup store could not be opened
    #[error("dedup store open failed: {0}")]
    DedupOpen(String),

    /// Dedup store is held by another writer
    #[error("dedup store is locked by another process: {0}")]
    DedupLock(String),

    /// Dedup store read failed
    #[error("dedup store read failed: {0}")]
    DedupRead(String),

    /// Dedup store write failed
    #[error("dedup store write failed: {0}")]
    DedupWrite(String),

    /// Classifier model could not be constructed
    #[error("classifier load failed: {0}")]
    ClassifierLoad(String),

    /// Classifier failed during inference
    #[error("classifier runtime error: {0}")]
    ClassifierRuntime(String),

    /// Sink append failed
    #[error("sink write failed: {0}")]
    SinkWrite(String),

    /// Run deadline expired before all communities were processed
    #[error("run deadline exceeded")]
    DeadlineExceeded,

    /// Metrics endpoint could not be started
    #[error("metrics endpoint error: {0}")]
    Metrics(String),
}

/// Convenience type alias for Result with CollectorError
pub type Result<T> = std::result::Result<T, CollectorError>;

impl CollectorError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a fatal source error.
    pub fn source_fatal(message: impl ToString) -> Self {
        Self::SourceFatal(message.to_string())
    }

    /// Create a classifier runtime error.
    pub fn classifier_runtime(message: impl ToString) -> Self {
        Self::ClassifierRuntime(message.to_string())
    }

    /// Component label for `pipeline_errors_total`.
    #[must_use]
    pub fn component(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::SourceAuth(_)
            | Self::SourceRateLimit { .. }
            | Self::SourceTransient(_)
            | Self::SourceFatal(_) => "source",
            Self::DedupOpen(_) | Self::DedupLock(_) | Self::DedupRead(_) | Self::DedupWrite(_) => {
                "dedup"
            }
            Self::ClassifierLoad(_) | Self::ClassifierRuntime(_) => "classifier",
            Self::SinkWrite(_) => "sink",
            Self::DeadlineExceeded => "pipeline",
            Self::Metrics(_) => "metrics",
        }
    }

    /// Error-kind label for `pipeline_errors_total` and `source_errors_total`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::SourceAuth(_) => "auth",
            Self::SourceRateLimit { .. } => "rate_limit",
            Self::SourceTransient(_) => "transient",
            Self::SourceFatal(_) => "fatal_response",
            Self::DedupOpen(_) => "dedup_open",
            Self::DedupLock(_) => "dedup_lock",
            Self::DedupRead(_) => "dedup_read",
            Self::DedupWrite(_) => "dedup_write",
            Self::ClassifierLoad(_) => "classifier_load",
            Self::ClassifierRuntime(_) => "classifier_runtime",
            Self::SinkWrite(_) => "sink_write",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Metrics(_) => "metrics",
        }
    }

    /// True for errors originating in the source client.
    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            Self::SourceAuth(_)
                | Self::SourceRateLimit { .. }
                | Self::SourceTransient(_)
                | Self::SourceFatal(_)
        )
    }

    /// Process exit code for a run that aborts with this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::DedupOpen(_) | Self::DedupLock(_) => 3,
            Self::ClassifierLoad(_) => 4,
            Self::DeadlineExceeded => 5,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CollectorError::config("x").exit_code(), 2);
        assert_eq!(CollectorError::DedupOpen("x".into()).exit_code(), 3);
        assert_eq!(CollectorError::DedupLock("x".into()).exit_code(), 3);
        assert_eq!(CollectorError::ClassifierLoad("x".into()).exit_code(), 4);
        assert_eq!(CollectorError::DeadlineExceeded.exit_code(), 5);
        assert_eq!(CollectorError::SinkWrite("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_labels() {
        let err = CollectorError::SourceRateLimit {
            message: "429".into(),
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(err.component(), "source");
        assert_eq!(err.kind(), "rate_limit");
        assert!(err.is_source());

        let err = CollectorError::SinkWrite("disk full".into());
        assert_eq!(err.component(), "sink");
        assert!(!err.is_source());
    }
}
