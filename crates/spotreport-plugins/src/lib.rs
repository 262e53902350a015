//! Classifier providers
//!
//! Each provider implements [`ContentClassifier`] and is compiled behind its
//! own cargo feature.

#[cfg(feature = "plugin-claude-vision")]
pub mod claude_vision;
#[cfg(feature = "plugin-http-classifier")]
pub mod http_classifier;

#[cfg(feature = "plugin-claude-vision")]
pub use claude_vision::{ClaudeVisionClassifier, ClaudeVisionConfig};
#[cfg(feature = "plugin-http-classifier")]
pub use http_classifier::HttpRelevanceClassifier;

use anyhow::Result;
use spotreport_core::PipelineConfig;
use spotreport_processing::ContentClassifier;
use std::sync::Arc;

/// Pick the classifier configured in `config`.
///
/// A relevance endpoint (`SPOTREPORT_CLASSIFIER_URL`) takes precedence over
/// Claude Vision (`ANTHROPIC_API_KEY`).
pub fn classifier_from_config(config: &PipelineConfig) -> Result<Arc<dyn ContentClassifier>> {
    #[cfg(feature = "plugin-http-classifier")]
    if let Some(url) = &config.classifier_url {
        tracing::info!(url = %url, "Using HTTP relevance classifier");
        return Ok(Arc::new(HttpRelevanceClassifier::new(
            url,
            config.api_request_timeout,
        )?));
    }

    #[cfg(feature = "plugin-claude-vision")]
    if let Some(api_key) = &config.anthropic_api_key {
        tracing::info!("Using Claude Vision classifier");
        return Ok(Arc::new(ClaudeVisionClassifier::new(
            api_key.clone(),
            ClaudeVisionConfig::default(),
        )?));
    }

    anyhow::bail!(
        "No content classifier configured: set SPOTREPORT_CLASSIFIER_URL or ANTHROPIC_API_KEY"
    )
}
