//! Container metadata via ffprobe

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;
use tokio::process::Command;

use super::{validate_binary_path, validate_path};

/// QuickTime/MP4 tag written by iOS with the local capture time and offset
const QUICKTIME_CREATION_DATE: &str = "com.apple.quicktime.creationdate";
/// Generic container creation tag written by most muxers
const CREATION_TIME: &str = "creation_time";

/// Capture-related tags read from a video container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerTags {
    /// `com.apple.quicktime.creationdate`
    pub capture_date: Option<DateTime<Utc>>,
    /// `creation_time`
    pub creation_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct VideoProbe {
    ffprobe_path: String,
}

impl VideoProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Result<Self> {
        let ffprobe_path = ffprobe_path.into();
        validate_binary_path(&ffprobe_path, "ffprobe")?;
        Ok(Self { ffprobe_path })
    }

    /// Read the container-level tags of the video at `video_path`.
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffprobe",
        process.executable.path = %self.ffprobe_path
    ))]
    pub async fn container_tags(&self, video_path: &Path) -> Result<ContainerTags> {
        validate_path(&video_path.to_string_lossy()).context("Invalid video path")?;

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(video_path)
            .output()
            .await
            .context("Failed to execute ffprobe")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        parse_container_tags(&output.stdout)
    }
}

/// Extract capture tags from ffprobe `-show_format` JSON output.
pub fn parse_container_tags(probe_output: &[u8]) -> Result<ContainerTags> {
    let probe_data: serde_json::Value =
        serde_json::from_slice(probe_output).context("Failed to parse ffprobe output")?;

    let tags = &probe_data["format"]["tags"];
    let tag = |name: &str| tags[name].as_str().and_then(parse_container_date);

    Ok(ContainerTags {
        capture_date: tag(QUICKTIME_CREATION_DATE),
        creation_time: tag(CREATION_TIME),
    })
}

/// Parse the date formats muxers write into container tags.
///
/// Accepts RFC 3339 (`2024-06-01T08:00:00.000000Z`), ISO 8601 with a compact
/// offset (`2024-06-01T10:00:00+0200`) and naive `YYYY-MM-DD HH:MM:SS`, which
/// is read as UTC.
pub fn parse_container_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    None
}
