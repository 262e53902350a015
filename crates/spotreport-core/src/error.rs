//! Error types module
//!
//! Every failure the pipeline surfaces falls into one of five classes
//! (see [`ErrorClass`]). Component crates define their own error enums and
//! describe themselves through [`ErrorMetadata`] so that callers can decide
//! between "retry", "continue without this artifact" and "abort" without
//! matching on concrete variants.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected outcomes like content rejections
    Debug,
    /// Warning level - for recoverable issues like transport failures
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Failure taxonomy shared by all pipeline components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Content judged not relevant (or the classifier could not answer).
    ValidationRejection,
    /// Network, timeout or unexpected status during upload, deletion or submission.
    Transport,
    /// Anti-forgery token rejected by the server.
    Authorization,
    /// Input rejected locally before any network call.
    MalformedInput,
    /// Compression or thumbnail generation produced no result.
    Encoding,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::ValidationRejection => "validation_rejection",
            ErrorClass::Transport => "transport",
            ErrorClass::Authorization => "authorization",
            ErrorClass::MalformedInput => "malformed_input",
            ErrorClass::Encoding => "encoding",
        }
    }
}

/// Metadata describing how an error should be presented to the caller.
pub trait ErrorMetadata {
    /// Taxonomy class of this error
    fn class(&self) -> ErrorClass;

    /// Machine-readable error code (e.g., "UPLOAD_TRANSPORT_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether the user can retry the same action
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the user
    fn suggested_action(&self) -> Option<&'static str>;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Malformed target context: {0}")]
    MalformedTarget(String),

    #[error("Content rejected: {0}")]
    ValidationRejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        PipelineError::Encoding(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Transport(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (class, error_code, recoverable, suggested_action, log_level).
fn pipeline_error_static_metadata(
    err: &PipelineError,
) -> (
    ErrorClass,
    &'static str,
    bool,
    Option<&'static str>,
    LogLevel,
) {
    match err {
        PipelineError::MalformedTarget(_) => (
            ErrorClass::MalformedInput,
            "MALFORMED_TARGET",
            false,
            Some("Pick a spot with a country, region and spot name"),
            LogLevel::Debug,
        ),
        PipelineError::ValidationRejected(_) => (
            ErrorClass::ValidationRejection,
            "CONTENT_REJECTED",
            false,
            Some("Select a different photo or video"),
            LogLevel::Debug,
        ),
        PipelineError::Transport(_) => (
            ErrorClass::Transport,
            "TRANSPORT_ERROR",
            true,
            Some("Retry, or continue without this media"),
            LogLevel::Warn,
        ),
        PipelineError::Authorization(_) => (
            ErrorClass::Authorization,
            "AUTHORIZATION_FAILED",
            false,
            Some("Sign in again and resubmit"),
            LogLevel::Warn,
        ),
        PipelineError::Encoding(_) => (
            ErrorClass::Encoding,
            "ENCODING_ERROR",
            false,
            Some("Continue without this media or pick another file"),
            LogLevel::Warn,
        ),
        PipelineError::InvalidState(_) => (
            ErrorClass::MalformedInput,
            "INVALID_STATE",
            true,
            Some("Wait for pending uploads to finish"),
            LogLevel::Debug,
        ),
        PipelineError::Config(_) => (
            ErrorClass::MalformedInput,
            "CONFIG_ERROR",
            false,
            None,
            LogLevel::Error,
        ),
        PipelineError::InternalWithSource { .. } => (
            ErrorClass::Transport,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for PipelineError {
    fn class(&self) -> ErrorClass {
        pipeline_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        pipeline_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        pipeline_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        pipeline_error_static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        pipeline_error_static_metadata(self).4
    }
}
