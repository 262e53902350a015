pub mod artifact;
pub mod media;
pub mod report;
pub mod target;
pub mod upload;

pub use artifact::{ArtifactKind, MediaKind};
pub use media::{MediaSelection, SelectionSummary, TimestampSource, ValidationResult};
pub use report::{MediaTypeField, ReportDraft, ReportPayload};
pub use target::SpotTarget;
pub use upload::{ArtifactStatus, UploadSnapshot, UploadState, UploadTicket};
