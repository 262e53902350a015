//! Upload, submission and flow errors

use spotreport_core::error::{ErrorClass, ErrorMetadata, LogLevel, PipelineError};
use spotreport_core::models::{ArtifactKind, UploadState};

use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{0} upload is in progress")]
    Busy(ArtifactKind),

    #[error("Report is submitted or abandoned; no new uploads accepted")]
    Closed,

    #[error("{kind} upload cannot be retried from {state:?}")]
    NotRetryable {
        kind: ArtifactKind,
        state: UploadState,
    },

    #[error("{kind} upload failed: {source}")]
    Transport {
        kind: ArtifactKind,
        #[source]
        source: TransportError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Uploads are still in progress")]
    UploadsInFlight,

    #[error("Report already submitted")]
    AlreadySubmitted,

    #[error("A submission is already in progress")]
    InProgress,

    #[error("Report was abandoned and its uploads deleted")]
    Abandoned,

    #[error("Could not obtain an anti-forgery token: {0}")]
    Token(#[source] TransportError),

    #[error("Anti-forgery token refused after refresh")]
    Forbidden,

    #[error("Submission failed: {0}")]
    Transport(#[source] TransportError),
}

/// Errors surfaced by [`crate::ReportFlow`].
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Report flow already finished")]
    Finished,
}

type StaticMetadata = (
    ErrorClass,
    &'static str,
    bool,
    Option<&'static str>,
    LogLevel,
);

fn upload_error_static_metadata(err: &UploadError) -> StaticMetadata {
    match err {
        UploadError::Pipeline(inner) => (
            inner.class(),
            inner.error_code(),
            inner.is_recoverable(),
            inner.suggested_action(),
            inner.log_level(),
        ),
        UploadError::Busy(_) => (
            ErrorClass::MalformedInput,
            "UPLOAD_BUSY",
            true,
            Some("Wait for the current upload to finish"),
            LogLevel::Debug,
        ),
        UploadError::Closed => (
            ErrorClass::MalformedInput,
            "UPLOADS_CLOSED",
            false,
            Some("Start a new report"),
            LogLevel::Debug,
        ),
        UploadError::NotRetryable { .. } => (
            ErrorClass::MalformedInput,
            "UPLOAD_NOT_RETRYABLE",
            false,
            None,
            LogLevel::Debug,
        ),
        UploadError::Transport { .. } => (
            ErrorClass::Transport,
            "UPLOAD_TRANSPORT_ERROR",
            true,
            Some("Retry the upload, or continue without this media"),
            LogLevel::Warn,
        ),
    }
}

fn submission_error_static_metadata(err: &SubmissionError) -> StaticMetadata {
    match err {
        SubmissionError::UploadsInFlight => (
            ErrorClass::MalformedInput,
            "UPLOADS_IN_FLIGHT",
            true,
            Some("Wait for uploads to finish, then submit again"),
            LogLevel::Debug,
        ),
        SubmissionError::AlreadySubmitted => (
            ErrorClass::MalformedInput,
            "ALREADY_SUBMITTED",
            false,
            None,
            LogLevel::Debug,
        ),
        SubmissionError::InProgress => (
            ErrorClass::MalformedInput,
            "SUBMISSION_IN_PROGRESS",
            true,
            Some("Wait for the current submission to finish"),
            LogLevel::Debug,
        ),
        SubmissionError::Abandoned => (
            ErrorClass::MalformedInput,
            "REPORT_ABANDONED",
            false,
            Some("Start a new report"),
            LogLevel::Debug,
        ),
        SubmissionError::Token(_) => (
            ErrorClass::Transport,
            "TOKEN_UNAVAILABLE",
            true,
            Some("Check your connection and submit again"),
            LogLevel::Warn,
        ),
        SubmissionError::Forbidden => (
            ErrorClass::Authorization,
            "SUBMISSION_FORBIDDEN",
            false,
            Some("Sign in again and resubmit"),
            LogLevel::Warn,
        ),
        SubmissionError::Transport(_) => (
            ErrorClass::Transport,
            "SUBMISSION_TRANSPORT_ERROR",
            true,
            Some("Submit again"),
            LogLevel::Warn,
        ),
    }
}

macro_rules! impl_error_metadata {
    ($ty:ty, $meta:ident) => {
        impl ErrorMetadata for $ty {
            fn class(&self) -> ErrorClass {
                $meta(self).0
            }

            fn error_code(&self) -> &'static str {
                $meta(self).1
            }

            fn is_recoverable(&self) -> bool {
                $meta(self).2
            }

            fn suggested_action(&self) -> Option<&'static str> {
                $meta(self).3
            }

            fn log_level(&self) -> LogLevel {
                $meta(self).4
            }
        }
    };
}

impl_error_metadata!(UploadError, upload_error_static_metadata);
impl_error_metadata!(SubmissionError, submission_error_static_metadata);

impl FlowError {
    fn inner(&self) -> Option<&dyn ErrorMetadata> {
        match self {
            FlowError::Pipeline(e) => Some(e as &dyn ErrorMetadata),
            FlowError::Upload(e) => Some(e as &dyn ErrorMetadata),
            FlowError::Submission(e) => Some(e as &dyn ErrorMetadata),
            FlowError::Finished => None,
        }
    }
}

impl ErrorMetadata for FlowError {
    fn class(&self) -> ErrorClass {
        self.inner().map_or(ErrorClass::MalformedInput, |e| e.class())
    }

    fn error_code(&self) -> &'static str {
        self.inner().map_or("FLOW_FINISHED", |e| e.error_code())
    }

    fn is_recoverable(&self) -> bool {
        self.inner().is_some_and(|e| e.is_recoverable())
    }

    fn suggested_action(&self) -> Option<&'static str> {
        match self.inner() {
            Some(e) => e.suggested_action(),
            None => Some("Start a new report"),
        }
    }

    fn log_level(&self) -> LogLevel {
        self.inner().map_or(LogLevel::Debug, |e| e.log_level())
    }
}
