//! Relevance validation through an external classifier

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spotreport_core::models::{MediaKind, ValidationResult};
use std::sync::Arc;

pub const NOT_RELEVANT_REASON: &str = "content not relevant";

/// Verdict returned by a classifier provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierVerdict {
    pub is_relevant: bool,
}

/// External content-classification provider.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    async fn validate_content(&self, media: &[u8], kind: MediaKind) -> Result<ClassifierVerdict>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// Runs one classifier call per artifact and folds the outcome into a
/// [`ValidationResult`]. Never retries.
#[derive(Clone)]
pub struct ContentValidator {
    classifier: Arc<dyn ContentClassifier>,
}

impl ContentValidator {
    pub fn new(classifier: Arc<dyn ContentClassifier>) -> Self {
        Self { classifier }
    }

    #[tracing::instrument(skip(self, media), fields(
        classifier = %self.classifier.name(),
        size = media.len()
    ))]
    pub async fn validate(&self, media: &[u8], kind: MediaKind) -> ValidationResult {
        match self.classifier.validate_content(media, kind).await {
            Ok(verdict) if verdict.is_relevant => {
                tracing::debug!("Content accepted");
                ValidationResult::pass()
            }
            Ok(_) => {
                tracing::info!("Content rejected as not relevant");
                ValidationResult::reject(NOT_RELEVANT_REASON)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Classifier call failed");
                ValidationResult::reject(e.to_string())
            }
        }
    }
}
