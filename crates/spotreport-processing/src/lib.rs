//! Spot Report Media Processing Library
//!
//! Everything that happens to a picked photo or clip before it is uploaded:
//! capture-time extraction, relevance validation, JPEG compression under a
//! byte budget and still-frame thumbnails for video.

pub mod image;
pub mod metadata;
pub mod transcoder;
pub mod validator;
pub mod video;

// Re-export commonly used types
pub use crate::image::{ImageOrientation, JpegEncoder, MozJpegEncoder};
pub use metadata::{
    AssetRecord, AssetStore, EmbeddedTimestamps, ExtractedTimestamp, MetadataExtractor,
};
pub use transcoder::{CompressionOutcome, MediaTranscoder, DEFAULT_BYTE_BUDGET};
pub use validator::{ClassifierVerdict, ContentClassifier, ContentValidator, NOT_RELEVANT_REASON};
pub use video::{ContainerTags, FfmpegFrameExtractor, FrameExtractor, VideoProbe};
