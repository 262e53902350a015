//! Processing-stage fakes and media fixtures

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use spotreport_core::models::MediaKind;
use spotreport_processing::{ClassifierVerdict, ContentClassifier, FrameExtractor};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Small decodable PNG of the given size.
pub fn png_fixture(width: u32, height: u32) -> Bytes {
    let img = ::image::RgbImage::from_fn(width, height, |x, y| {
        ::image::Rgb([(x * 5 % 256) as u8, (y * 3 % 256) as u8, 120])
    });
    let mut out = Cursor::new(Vec::new());
    ::image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ::image::ImageFormat::Png)
        .unwrap();
    Bytes::from(out.into_inner())
}

enum Verdict {
    Relevant(bool),
    Error(String),
}

/// Classifier with a fixed answer that records what it was shown.
pub struct FakeClassifier {
    verdict: Verdict,
    delay: Option<Duration>,
    seen: Mutex<Vec<(usize, MediaKind)>>,
}

impl FakeClassifier {
    pub fn relevant() -> Arc<Self> {
        Self::build(Verdict::Relevant(true))
    }

    pub fn irrelevant() -> Arc<Self> {
        Self::build(Verdict::Relevant(false))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::build(Verdict::Error(message.to_string()))
    }

    /// Relevant verdict, answered after sleeping for `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            verdict: Verdict::Relevant(true),
            delay: Some(delay),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn build(verdict: Verdict) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            delay: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    /// `(size, kind)` of every classified payload.
    pub fn seen(&self) -> Vec<(usize, MediaKind)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentClassifier for FakeClassifier {
    async fn validate_content(&self, media: &[u8], kind: MediaKind) -> Result<ClassifierVerdict> {
        self.seen.lock().unwrap().push((media.len(), kind));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.verdict {
            Verdict::Relevant(is_relevant) => Ok(ClassifierVerdict {
                is_relevant: *is_relevant,
            }),
            Verdict::Error(message) => Err(anyhow!("{}", message)),
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Frame extractor returning a fixed frame, or failing when `frame` is `None`.
pub struct FixedFrames {
    frame: Option<Bytes>,
    calls: AtomicUsize,
}

impl FixedFrames {
    pub fn returning(frame: Bytes) -> Arc<Self> {
        Arc::new(Self {
            frame: Some(frame),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn undecodable() -> Arc<Self> {
        Arc::new(Self {
            frame: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameExtractor for FixedFrames {
    async fn extract_frame(
        &self,
        video_path: &Path,
        _at_second: f64,
        _max_dimension: u32,
    ) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !video_path.exists() {
            return Err(anyhow!("video was not staged"));
        }
        self.frame
            .clone()
            .ok_or_else(|| anyhow!("ffmpeg could not decode the video"))
    }
}
