//! Video helpers backed by the FFmpeg command line tools

pub mod frames;
pub mod probe;

pub use frames::{FfmpegFrameExtractor, FrameExtractor};
pub use probe::{ContainerTags, VideoProbe};

use anyhow::{anyhow, Result};

/// Validate that a path doesn't contain shell metacharacters or dangerous sequences
pub(crate) fn validate_path(path: &str) -> Result<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!("Path contains dangerous characters: {}", path));
    }

    if path.contains("..") {
        return Err(anyhow!("Path contains directory traversal: {}", path));
    }

    Ok(())
}

/// Validate the configured location of an FFmpeg binary.
pub(crate) fn validate_binary_path(path: &str, name: &str) -> Result<()> {
    validate_path(path).map_err(|e| anyhow!("Invalid {} path: {}", name, e))?;

    if !path
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '\\'))
    {
        return Err(anyhow!("Invalid {} path: contains unsafe characters", name));
    }

    Ok(())
}
