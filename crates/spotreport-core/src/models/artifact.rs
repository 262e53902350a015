use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media a user attaches to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploadable unit. A video selection produces two artifacts: the clip
/// itself and a still thumbnail uploaded as an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Image,
    Video,
    VideoThumbnail,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Image,
        ArtifactKind::Video,
        ArtifactKind::VideoThumbnail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Image => "image",
            ArtifactKind::Video => "video",
            ArtifactKind::VideoThumbnail => "video_thumbnail",
        }
    }

    /// Content type sent with the blob PUT.
    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::Image | ArtifactKind::VideoThumbnail => "image/jpeg",
            ArtifactKind::Video => "video/mp4",
        }
    }

    /// Storage routing type used by the upload-URL and deletion endpoints.
    /// Thumbnails are stored as images.
    pub fn storage_type(self) -> MediaKind {
        match self {
            ArtifactKind::Image | ArtifactKind::VideoThumbnail => MediaKind::Image,
            ArtifactKind::Video => MediaKind::Video,
        }
    }

    /// Whether a failed upload of this artifact is surfaced with a retry affordance.
    pub fn is_user_visible(self) -> bool {
        !matches!(self, ArtifactKind::VideoThumbnail)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
