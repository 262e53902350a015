//! Relevance classification with Anthropic's Claude API

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use spotreport_core::models::MediaKind;
use spotreport_processing::{ClassifierVerdict, ContentClassifier};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

const RELEVANCE_PROMPT: &str = "You are screening photos attached to surf spot condition reports. \
Decide whether this image shows a surf spot, beach, coastline or ocean conditions \
(waves, swell, tide, weather over water). Respond with JSON only, in the form \
{\"isRelevant\": true} or {\"isRelevant\": false}.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeVisionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    API_BASE.to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    64
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ClaudeVisionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

pub struct ClaudeVisionClassifier {
    http_client: reqwest::Client,
    api_key: String,
    config: ClaudeVisionConfig,
}

impl Debug for ClaudeVisionClassifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ClaudeVisionClassifier")
            .field("model", &self.config.model)
            .finish()
    }
}

// Messages API request/response structures
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageParam>,
}

#[derive(Debug, Serialize)]
struct MessageParam {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlockResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockResponse {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl ClaudeVisionClassifier {
    pub fn new(api_key: String, config: ClaudeVisionConfig) -> Result<Self> {
        if api_key.trim().is_empty() || api_key.len() < 10 {
            anyhow::bail!("Claude Vision API key appears to be invalid or a placeholder");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client for Claude Vision")?;

        Ok(Self {
            http_client,
            api_key,
            config: ClaudeVisionConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
        })
    }

    fn build_request(&self, image_data: &[u8], media_type: &'static str) -> MessagesRequest<'_> {
        MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![MessageParam {
                role: "user",
                content: vec![
                    ContentBlock::Image {
                        source: ImageSource {
                            source_type: "base64",
                            media_type,
                            data: base64::engine::general_purpose::STANDARD.encode(image_data),
                        },
                    },
                    ContentBlock::Text {
                        text: RELEVANCE_PROMPT.to_string(),
                    },
                ],
            }],
        }
    }

    /// Parse the model's answer, tolerating markdown code fences
    fn parse_verdict(text: &str) -> Result<ClassifierVerdict> {
        let json_text = if text.contains("```json") {
            text.split("```json")
                .nth(1)
                .and_then(|s| s.split("```").next())
                .unwrap_or(text)
                .trim()
        } else if text.contains("```") {
            text.split("```").nth(1).unwrap_or(text).trim()
        } else {
            text.trim()
        };

        serde_json::from_str(json_text).context("Failed to parse Claude verdict as JSON")
    }
}

/// Detect image media type from magic numbers.
fn detect_image_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }
    if data.starts_with(b"GIF8") {
        return Some("image/gif");
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

#[async_trait]
impl ContentClassifier for ClaudeVisionClassifier {
    async fn validate_content(&self, media: &[u8], kind: MediaKind) -> Result<ClassifierVerdict> {
        // Videos are judged on a still frame; raw containers are not accepted
        let media_type = detect_image_type(media)
            .with_context(|| format!("Claude Vision cannot classify this {} data", kind))?;

        tracing::debug!(
            size = media.len(),
            media_type = media_type,
            model = %self.config.model,
            "Sending media to Claude Vision"
        );

        let response = self
            .http_client
            .post(format!("{}/messages", self.config.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.build_request(media, media_type))
            .send()
            .await
            .context("Failed to send request to Claude Vision API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Claude Vision API request failed: {} - {}", status, error_text);
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Claude Vision API response")?;

        let text = parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlockResponse::Text { text } => Some(text),
                ContentBlockResponse::Other => None,
            })
            .context("Claude Vision response contained no text")?;

        Self::parse_verdict(&text)
    }

    fn name(&self) -> &str {
        "claude_vision"
    }
}
