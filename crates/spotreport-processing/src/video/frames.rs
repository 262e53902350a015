//! Still-frame extraction

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{validate_binary_path, validate_path};

/// Grabs one frame of a video as JPEG.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Extract the frame at `at_second`, scaled to fit inside
    /// `max_dimension`×`max_dimension` without upscaling.
    async fn extract_frame(
        &self,
        video_path: &Path,
        at_second: f64,
        max_dimension: u32,
    ) -> Result<Bytes>;
}

#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    ffmpeg_path: String,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg_path: impl Into<String>) -> Result<Self> {
        let ffmpeg_path = ffmpeg_path.into();
        validate_binary_path(&ffmpeg_path, "ffmpeg")?;
        Ok(Self { ffmpeg_path })
    }

    fn scale_filter(max_dimension: u32) -> String {
        format!(
            "scale=w={0}:h={0}:force_original_aspect_ratio=decrease",
            max_dimension
        )
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "thumbnail"
    ))]
    async fn extract_frame(
        &self,
        video_path: &Path,
        at_second: f64,
        max_dimension: u32,
    ) -> Result<Bytes> {
        validate_path(&video_path.to_string_lossy()).context("Invalid video path")?;

        let output_file = tempfile::Builder::new()
            .prefix("spotreport-thumb-")
            .suffix(".jpg")
            .tempfile()
            .context("Failed to create thumbnail temp file")?
            .into_temp_path();

        let output = Command::new(&self.ffmpeg_path)
            .args(["-y", "-v", "error", "-ss", &format!("{:.3}", at_second), "-i"])
            .arg(video_path)
            .args(["-frames:v", "1", "-vf", &Self::scale_filter(max_dimension)])
            .args(["-q:v", "3"])
            .arg(&*output_file)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to execute ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("FFmpeg frame extraction failed: {}", stderr));
        }

        let data = tokio::fs::read(&output_file)
            .await
            .context("Failed to read extracted frame")?;

        // ffmpeg exits 0 without writing a frame when the offset is past the end
        if data.is_empty() {
            return Err(anyhow!("No frame at {}s", at_second));
        }

        tracing::debug!(bytes = data.len(), "Frame extracted");
        Ok(Bytes::from(data))
    }
}
