//! Relevance classifier behind a plain HTTP endpoint
//!
//! `POST {base_url}/validate-content` with the media base64-encoded in a JSON
//! body; the endpoint answers `{"isRelevant": bool}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use spotreport_core::models::MediaKind;
use spotreport_processing::{ClassifierVerdict, ContentClassifier};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateContentRequest<'a> {
    media_type: &'a str,
    content: String,
}

pub struct HttpRelevanceClassifier {
    http_client: reqwest::Client,
    base_url: String,
}

impl Debug for HttpRelevanceClassifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("HttpRelevanceClassifier")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpRelevanceClassifier {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for relevance classifier")?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/validate-content", self.base_url)
    }
}

#[async_trait]
impl ContentClassifier for HttpRelevanceClassifier {
    async fn validate_content(&self, media: &[u8], kind: MediaKind) -> Result<ClassifierVerdict> {
        let body = ValidateContentRequest {
            media_type: kind.as_str(),
            content: base64::engine::general_purpose::STANDARD.encode(media),
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .context("Failed to send request to relevance classifier")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!(
                "Relevance classifier request failed: {} - {}",
                status,
                error_text
            );
        }

        let verdict: ClassifierVerdict = response
            .json()
            .await
            .context("Failed to parse relevance classifier response")?;

        tracing::debug!(
            media_type = kind.as_str(),
            is_relevant = verdict.is_relevant,
            "Relevance classifier verdict"
        );

        Ok(verdict)
    }

    fn name(&self) -> &str {
        "http_relevance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_relevant_verdict() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/validate-content")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "mediaType": "image",
                "content": "AQID"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"isRelevant": true}"#)
            .create_async()
            .await;

        let classifier =
            HttpRelevanceClassifier::new(format!("{}/", server.url()), Duration::from_secs(5))
                .unwrap();
        let verdict = classifier
            .validate_content(&[1, 2, 3], MediaKind::Image)
            .await
            .unwrap();

        assert!(verdict.is_relevant);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_irrelevant_verdict() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/validate-content")
            .with_status(200)
            .with_body(r#"{"isRelevant": false}"#)
            .create_async()
            .await;

        let classifier = HttpRelevanceClassifier::new(server.url(), Duration::from_secs(5)).unwrap();
        let verdict = classifier
            .validate_content(b"clip", MediaKind::Video)
            .await
            .unwrap();
        assert!(!verdict.is_relevant);
    }

    #[tokio::test]
    async fn test_server_error_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/validate-content")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let classifier = HttpRelevanceClassifier::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = classifier
            .validate_content(b"jpeg", MediaKind::Image)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/validate-content")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let classifier = HttpRelevanceClassifier::new(server.url(), Duration::from_secs(5)).unwrap();
        assert!(classifier
            .validate_content(b"jpeg", MediaKind::Image)
            .await
            .is_err());
    }
}
