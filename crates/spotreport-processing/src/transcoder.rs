//! Byte-budget JPEG compression and video thumbnails

use ::image::{imageops::FilterType, DynamicImage, GenericImageView};
use anyhow::{Context, Result};
use bytes::Bytes;
use spotreport_core::models::MediaSelection;
use std::sync::Arc;

use crate::image::{ImageOrientation, JpegEncoder, MozJpegEncoder};
use crate::video::{FfmpegFrameExtractor, FrameExtractor};

pub const DEFAULT_BYTE_BUDGET: usize = 1_000_000;

// Qualities are stepped in tenths to avoid float drift: 0.5, 0.4, ... 0.1
const INITIAL_QUALITY_STEP: u8 = 5;
const QUALITY_FLOOR_STEP: u8 = 1;
const RESIZE_BOUND: u32 = 1200;
const RESIZE_QUALITY: f32 = 0.4;
const THUMBNAIL_QUALITY: f32 = 0.7;
const DEFAULT_THUMBNAIL_DIMENSION: u32 = 300;

/// Result of one compression run.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub data: Bytes,
    /// Quality of the encode that produced `data`
    pub final_quality: f32,
    /// Whether the 1200×1200 resize pass ran
    pub resized: bool,
    pub attempts: u32,
    /// Whether the quality loop reached 0.1 while still over budget
    pub quality_floor_reached: bool,
}

impl CompressionOutcome {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Clone)]
pub struct MediaTranscoder {
    encoder: Arc<dyn JpegEncoder>,
    frames: Arc<dyn FrameExtractor>,
    thumbnail_max_dimension: u32,
}

impl MediaTranscoder {
    pub fn new(encoder: Arc<dyn JpegEncoder>, frames: Arc<dyn FrameExtractor>) -> Self {
        Self {
            encoder,
            frames,
            thumbnail_max_dimension: DEFAULT_THUMBNAIL_DIMENSION,
        }
    }

    /// mozjpeg encoder plus ffmpeg frame grabs at `ffmpeg_path`.
    pub fn with_defaults(ffmpeg_path: &str) -> Result<Self> {
        Ok(Self::new(
            Arc::new(MozJpegEncoder),
            Arc::new(FfmpegFrameExtractor::new(ffmpeg_path)?),
        ))
    }

    pub fn with_thumbnail_max_dimension(mut self, max_dimension: u32) -> Self {
        self.thumbnail_max_dimension = max_dimension;
        self
    }

    /// Decode `data`, bake in its EXIF orientation and compress it under
    /// `byte_budget`.
    pub fn compress(&self, data: &[u8], byte_budget: usize) -> Result<CompressionOutcome> {
        let img = ::image::load_from_memory(data).context("Failed to decode image")?;
        let img = ImageOrientation::apply_exif_orientation(img, data);
        self.compress_image(&img, byte_budget)
    }

    /// Same as [`MediaTranscoder::compress`], on the blocking thread pool.
    pub async fn compress_async(&self, data: Bytes, byte_budget: usize) -> Result<CompressionOutcome> {
        let transcoder = self.clone();
        tokio::task::spawn_blocking(move || transcoder.compress(&data, byte_budget))
            .await
            .context("Compression task panicked")?
    }

    /// Quality loop 0.5 → 0.1 and, if still over budget, one resize to fit
    /// 1200×1200 re-encoded at 0.4. The resized result is accepted as is.
    pub fn compress_image(&self, img: &DynamicImage, byte_budget: usize) -> Result<CompressionOutcome> {
        let mut step = INITIAL_QUALITY_STEP;
        let mut attempts = 0;

        loop {
            let quality = f32::from(step) / 10.0;
            let data = self.encoder.encode(img, quality)?;
            attempts += 1;

            tracing::debug!(quality = quality, size = data.len(), budget = byte_budget, "Encoded");

            if data.len() <= byte_budget {
                return Ok(CompressionOutcome {
                    data,
                    final_quality: quality,
                    resized: false,
                    attempts,
                    quality_floor_reached: false,
                });
            }
            if step <= QUALITY_FLOOR_STEP {
                break;
            }
            step -= 1;
        }

        let (width, height) = img.dimensions();
        let resized_img = if width > RESIZE_BOUND || height > RESIZE_BOUND {
            img.resize(RESIZE_BOUND, RESIZE_BOUND, FilterType::Lanczos3)
        } else {
            img.clone()
        };
        let data = self.encoder.encode(&resized_img, RESIZE_QUALITY)?;
        attempts += 1;

        tracing::info!(
            original_width = width,
            original_height = height,
            width = resized_img.width(),
            height = resized_img.height(),
            size = data.len(),
            budget = byte_budget,
            "Quality floor reached, resized"
        );

        Ok(CompressionOutcome {
            data,
            final_quality: RESIZE_QUALITY,
            resized: true,
            attempts,
            quality_floor_reached: true,
        })
    }

    /// JPEG still of `video` at `at_second`, bounded to the thumbnail box.
    ///
    /// Any failure yields `None`; a missing thumbnail never blocks the video.
    #[tracing::instrument(skip(self, video))]
    pub async fn generate_thumbnail(&self, video: &mut MediaSelection, at_second: f64) -> Option<Bytes> {
        let max_dimension = self.thumbnail_max_dimension;
        let result = async {
            let path = video.staged_path().context("Failed to stage video")?;
            let frame = self
                .frames
                .extract_frame(path, at_second, max_dimension)
                .await?;
            self.bound_frame(frame, max_dimension)
        }
        .await;

        match result {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!(error = %e, "Thumbnail generation failed");
                None
            }
        }
    }

    /// Check the frame decodes and fits the box; shrink and re-encode if not.
    fn bound_frame(&self, frame: Bytes, max_dimension: u32) -> Result<Bytes> {
        let img = ::image::load_from_memory(&frame).context("Failed to decode frame")?;
        if img.width() <= max_dimension && img.height() <= max_dimension {
            return Ok(frame);
        }

        let bounded = img.resize(max_dimension, max_dimension, FilterType::Triangle);
        self.encoder.encode(&bounded, THUMBNAIL_QUALITY)
    }
}
