//! Error types for the Writer's Pack pipeline.
//!
//! Library crates use [`WriterPackError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum WriterPackError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Connection-level failure talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// An external call did not finish within its time budget.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Non-success HTTP status from a provider.
    #[error("HTTP {status} from {service}: {message}")]
    Http {
        service: String,
        status: u16,
        message: String,
    },

    /// Provider answered successfully but with no usable content.
    #[error("empty response from {0}")]
    EmptyResponse(String),

    /// Free-form or structured content could not be interpreted.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (topic, role, directive, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Trend keywords could not be summarized; callers fall back.
    #[error("summarization error: {0}")]
    Summarization(String),

    /// The research call failed after its retry budget.
    #[error("research unavailable: {0}")]
    ResearchUnavailable(String),

    /// Internal link suggestion failed; callers use empty suggestions.
    #[error("link suggestion failure: {0}")]
    LinkSuggestion(String),

    /// Draft generation failed. Fatal for the pipeline invocation.
    #[error("writer failure: {0}")]
    Writer(String),

    /// Creating the remote draft post failed.
    #[error("publish failure: {0}")]
    Publish(String),

    /// Caller's role may not perform the requested action.
    #[error("role '{role}' is not authorized to {action}")]
    Unauthorized { role: String, action: String },

    /// A pipeline stage failed unrecoverably.
    #[error("pipeline failed during {stage}: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<WriterPackError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WriterPackError>;

impl WriterPackError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the name of the failing pipeline stage.
    pub fn at_stage(self, stage: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Whether a retry of the same call could plausibly succeed.
    ///
    /// Only connection failures, timeouts, rate limiting and server-side
    /// errors qualify. A malformed or empty answer is permanent for that call.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Stage { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = WriterPackError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = WriterPackError::Timeout {
            operation: "research".into(),
            secs: 60,
        };
        assert_eq!(err.to_string(), "research timed out after 60s");
    }

    #[test]
    fn retryable_classification() {
        assert!(WriterPackError::Network("reset".into()).is_retryable());
        assert!(
            WriterPackError::Http {
                service: "openai".into(),
                status: 429,
                message: "slow down".into()
            }
            .is_retryable()
        );
        assert!(
            WriterPackError::Http {
                service: "gemini".into(),
                status: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !WriterPackError::Http {
                service: "openai".into(),
                status: 401,
                message: "bad key".into()
            }
            .is_retryable()
        );
        assert!(!WriterPackError::EmptyResponse("openai".into()).is_retryable());
        assert!(!WriterPackError::parse("garbled").is_retryable());
    }

    #[test]
    fn stage_wrapping_keeps_source() {
        let err = WriterPackError::Writer("no body".into()).at_stage("drafting");
        assert_eq!(
            err.to_string(),
            "pipeline failed during drafting: writer failure: no body"
        );
        assert!(!err.is_retryable());
    }
}
