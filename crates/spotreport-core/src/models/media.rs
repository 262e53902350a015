use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;

use super::artifact::MediaKind;

/// Where a capture timestamp came from, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Embedded "original capture" field (EXIF DateTimeOriginal or container creation date)
    EmbeddedCapture,
    /// Embedded generic modification field (EXIF DateTime or container creation_time)
    EmbeddedModified,
    /// Creation time recorded by the asset store
    AssetCreated,
    /// Modification time recorded by the asset store
    AssetModified,
    /// Nothing could be extracted; the operator's clock was used
    OperatorSupplied,
}

impl TimestampSource {
    /// Whether the timestamp was extracted from the media rather than supplied.
    pub fn is_extracted(self) -> bool {
        !matches!(self, TimestampSource::OperatorSupplied)
    }
}

/// Media picked by the user for the current report.
///
/// Video selections may be staged to a temporary file for ffmpeg/ffprobe; the
/// file is removed when the selection is dropped or [`MediaSelection::clear_staged_file`]
/// is called.
#[derive(Debug)]
pub struct MediaSelection {
    kind: MediaKind,
    data: Bytes,
    asset_id: Option<String>,
    capture_timestamp: Option<DateTime<Utc>>,
    timestamp_resolved: bool,
    timestamp_source: Option<TimestampSource>,
    staged_file: Option<TempPath>,
}

impl MediaSelection {
    pub fn image(data: impl Into<Bytes>) -> Self {
        Self::new(MediaKind::Image, data.into())
    }

    pub fn video(data: impl Into<Bytes>) -> Self {
        Self::new(MediaKind::Video, data.into())
    }

    fn new(kind: MediaKind, data: Bytes) -> Self {
        Self {
            kind,
            data,
            asset_id: None,
            capture_timestamp: None,
            timestamp_resolved: false,
            timestamp_source: None,
            staged_file: None,
        }
    }

    /// Attach the identifier of the asset-store record the media was picked from.
    pub fn with_asset_id(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn asset_id(&self) -> Option<&str> {
        self.asset_id.as_deref()
    }

    pub fn capture_timestamp(&self) -> Option<DateTime<Utc>> {
        self.capture_timestamp
    }

    pub fn timestamp_resolved(&self) -> bool {
        self.timestamp_resolved
    }

    pub fn timestamp_source(&self) -> Option<TimestampSource> {
        self.timestamp_source
    }

    /// Record the capture timestamp. Only extracted timestamps count as resolved.
    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>, source: TimestampSource) {
        self.capture_timestamp = Some(timestamp);
        self.timestamp_source = Some(source);
        self.timestamp_resolved = source.is_extracted();
    }

    /// Write the media bytes to a temporary file (once) and return its path.
    pub fn staged_path(&mut self) -> std::io::Result<&Path> {
        if self.staged_file.is_none() {
            let suffix = match self.kind {
                MediaKind::Image => ".jpg",
                MediaKind::Video => ".mp4",
            };
            let mut file = tempfile::Builder::new()
                .prefix("spotreport-")
                .suffix(suffix)
                .tempfile()?;
            file.write_all(&self.data)?;
            file.flush()?;
            self.staged_file = Some(file.into_temp_path());
        }

        match self.staged_file.as_deref() {
            Some(path) => Ok(path),
            None => Err(std::io::Error::other("staged file missing")),
        }
    }

    pub fn has_staged_file(&self) -> bool {
        self.staged_file.is_some()
    }

    /// Remove the temporary file backing this selection, if any.
    pub fn clear_staged_file(&mut self) {
        if let Some(path) = self.staged_file.take() {
            if let Err(e) = path.close() {
                tracing::warn!(error = %e, "Failed to remove staged media file");
            }
        }
    }

    pub fn summary(&self) -> SelectionSummary {
        SelectionSummary {
            kind: self.kind,
            size_bytes: self.data.len(),
            capture_timestamp: self.capture_timestamp,
            timestamp_resolved: self.timestamp_resolved,
            timestamp_source: self.timestamp_source,
        }
    }
}

/// Cheap, cloneable view of a selection for observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionSummary {
    pub kind: MediaKind,
    pub size_bytes: usize,
    pub capture_timestamp: Option<DateTime<Utc>>,
    pub timestamp_resolved: bool,
    pub timestamp_source: Option<TimestampSource>,
}

/// Outcome of one relevance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
        }
    }
}
