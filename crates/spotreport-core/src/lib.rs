//! Spot Report Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration and the
//! observable state container shared by every stage of the media pipeline.

pub mod config;
pub mod error;
pub mod models;
pub mod observable;
pub mod telemetry;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{ErrorClass, ErrorMetadata, LogLevel, PipelineError};
pub use models::{
    ArtifactKind, ArtifactStatus, MediaKind, MediaSelection, MediaTypeField, ReportDraft,
    ReportPayload, SelectionSummary, SpotTarget, TimestampSource, UploadSnapshot, UploadState,
    UploadTicket, ValidationResult,
};
pub use observable::Observable;
