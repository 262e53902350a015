//! Configuration module
//!
//! Pipeline settings are read from the environment (a `.env` file is loaded
//! first when present). Every value has a default so a bare environment yields
//! a usable development configuration.

use std::env;
use std::time::Duration;

// Common constants
const API_BASE_URL: &str = "http://localhost:3000";
const API_VERSION: &str = "v0";
const IMAGE_BYTE_BUDGET: usize = 1_000_000;
const IMAGE_UPLOAD_TIMEOUT_SECS: u64 = 30;
const VIDEO_UPLOAD_TIMEOUT_SECS: u64 = 120;
const API_REQUEST_TIMEOUT_SECS: u64 = 60;
const THUMBNAIL_OFFSET_SECS: f64 = 1.0;
const THUMBNAIL_MAX_DIMENSION: u32 = 300;

/// Settings for one pipeline instance (one signed-in user session).
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub api_base_url: String,
    pub api_version: String,
    /// Raw `name=value` session cookie sent with authenticated requests
    pub session_cookie: Option<String>,
    pub image_byte_budget: usize,
    pub image_upload_timeout: Duration,
    pub video_upload_timeout: Duration,
    pub api_request_timeout: Duration,
    pub thumbnail_offset_secs: f64,
    pub thumbnail_max_dimension: u32,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    // Classifier providers
    pub classifier_url: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: API_BASE_URL.to_string(),
            api_version: API_VERSION.to_string(),
            session_cookie: None,
            image_byte_budget: IMAGE_BYTE_BUDGET,
            image_upload_timeout: Duration::from_secs(IMAGE_UPLOAD_TIMEOUT_SECS),
            video_upload_timeout: Duration::from_secs(VIDEO_UPLOAD_TIMEOUT_SECS),
            api_request_timeout: Duration::from_secs(API_REQUEST_TIMEOUT_SECS),
            thumbnail_offset_secs: THUMBNAIL_OFFSET_SECS,
            thumbnail_max_dimension: THUMBNAIL_MAX_DIMENSION,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            classifier_url: None,
            anthropic_api_key: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("SPOTREPORT_API_URL")
            .or_else(|| lookup("API_URL"))
            .unwrap_or(defaults.api_base_url)
            .trim_end_matches('/')
            .to_string();

        let api_version = lookup("SPOTREPORT_API_VERSION").unwrap_or(defaults.api_version);

        let session_cookie = lookup("SPOTREPORT_SESSION_COOKIE").filter(|s| !s.trim().is_empty());

        let image_byte_budget = parse_or(
            lookup("SPOTREPORT_IMAGE_BYTE_BUDGET"),
            IMAGE_BYTE_BUDGET,
            "SPOTREPORT_IMAGE_BYTE_BUDGET",
        )?;

        let image_upload_timeout = Duration::from_secs(parse_or(
            lookup("SPOTREPORT_IMAGE_UPLOAD_TIMEOUT_SECS"),
            IMAGE_UPLOAD_TIMEOUT_SECS,
            "SPOTREPORT_IMAGE_UPLOAD_TIMEOUT_SECS",
        )?);

        let video_upload_timeout = Duration::from_secs(parse_or(
            lookup("SPOTREPORT_VIDEO_UPLOAD_TIMEOUT_SECS"),
            VIDEO_UPLOAD_TIMEOUT_SECS,
            "SPOTREPORT_VIDEO_UPLOAD_TIMEOUT_SECS",
        )?);

        let api_request_timeout = Duration::from_secs(parse_or(
            lookup("SPOTREPORT_API_TIMEOUT_SECS"),
            API_REQUEST_TIMEOUT_SECS,
            "SPOTREPORT_API_TIMEOUT_SECS",
        )?);

        let ffmpeg_path = lookup("SPOTREPORT_FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path);
        let ffprobe_path = lookup("SPOTREPORT_FFPROBE_PATH").unwrap_or(defaults.ffprobe_path);

        let config = Self {
            api_base_url,
            api_version,
            session_cookie,
            image_byte_budget,
            image_upload_timeout,
            video_upload_timeout,
            api_request_timeout,
            thumbnail_offset_secs: defaults.thumbnail_offset_secs,
            thumbnail_max_dimension: defaults.thumbnail_max_dimension,
            ffmpeg_path,
            ffprobe_path,
            classifier_url: lookup("SPOTREPORT_CLASSIFIER_URL"),
            anthropic_api_key: lookup("ANTHROPIC_API_KEY"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(anyhow::anyhow!(
                "SPOTREPORT_API_URL must be an http(s) URL, got '{}'",
                self.api_base_url
            ));
        }

        if self.image_byte_budget == 0 {
            return Err(anyhow::anyhow!(
                "SPOTREPORT_IMAGE_BYTE_BUDGET must be greater than zero"
            ));
        }

        if self.video_upload_timeout < self.image_upload_timeout {
            return Err(anyhow::anyhow!(
                "Video upload timeout ({:?}) must not be shorter than the image upload timeout ({:?})",
                self.video_upload_timeout,
                self.image_upload_timeout
            ));
        }

        Ok(())
    }

    /// API version prefix (e.g. "/api/v0").
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    default: T,
    name: &str,
) -> Result<T, anyhow::Error> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", name, value)),
    }
}
