//! Report API endpoints behind the transport traits.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spotreport_core::models::{ArtifactKind, MediaKind, ReportPayload, SpotTarget, UploadTicket};
use std::time::Duration;

use crate::transport::{
    DeletionTransport, ReportConfirmation, ReportTransport, TokenProvider, TransportError,
    UploadTransport,
};
use crate::{map_reqwest_error, ApiClient};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlRequest<'a> {
    country: &'a str,
    region: &'a str,
    spot: &'a str,
    media_type: MediaKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlResponse {
    upload_url: String,
    remote_key: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CsrfTokenResponse {
    token: String,
}

#[async_trait]
impl UploadTransport for ApiClient {
    #[tracing::instrument(skip(self), fields(target = %target, artifact = %kind))]
    async fn request_upload_url(
        &self,
        target: &SpotTarget,
        kind: ArtifactKind,
    ) -> Result<UploadTicket, TransportError> {
        let body = UploadUrlRequest {
            country: &target.country,
            region: &target.region,
            spot: &target.spot,
            media_type: kind.storage_type(),
        };
        let response: UploadUrlResponse = self
            .send_json(self.request(Method::POST, "/media/upload-url").json(&body))
            .await?;

        if response.upload_url.is_empty() || response.remote_key.is_empty() {
            return Err(TransportError::InvalidResponse(
                "upload URL response is missing uploadUrl or remoteKey".to_string(),
            ));
        }

        Ok(UploadTicket {
            artifact_kind: kind,
            remote_key: response.remote_key,
            upload_url: response.upload_url,
            issued_at: Utc::now(),
            expires_at: response.expires_at,
        })
    }

    #[tracing::instrument(skip(self, ticket, data), fields(remote_key = %ticket.remote_key, size = data.len()))]
    async fn put_blob(
        &self,
        ticket: &UploadTicket,
        data: Bytes,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        // Presigned URLs carry their own authorization
        let response = self
            .client()
            .put(&ticket.upload_url)
            .header("Content-Type", ticket.artifact_kind.content_type())
            .timeout(timeout)
            .body(data)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl DeletionTransport for ApiClient {
    async fn delete_media(
        &self,
        remote_key: &str,
        storage_type: MediaKind,
    ) -> Result<(), TransportError> {
        let path = format!(
            "/media?key={}&type={}",
            urlencoding::encode(remote_key),
            storage_type.as_str()
        );
        self.send(self.request(Method::DELETE, &path), self.timeout)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TokenProvider for ApiClient {
    async fn fetch_token(&self) -> Result<String, TransportError> {
        let response: CsrfTokenResponse = self
            .send_json(self.request(Method::GET, "/csrf-token"))
            .await?;
        if response.token.is_empty() {
            return Err(TransportError::InvalidResponse("empty CSRF token".to_string()));
        }
        Ok(response.token)
    }
}

#[async_trait]
impl ReportTransport for ApiClient {
    #[tracing::instrument(skip(self, payload, csrf_token), fields(media_type = ?payload.media_type))]
    async fn post_report(
        &self,
        payload: &ReportPayload,
        csrf_token: &str,
    ) -> Result<ReportConfirmation, TransportError> {
        let request = self
            .request(Method::POST, "/reports")
            .header("X-CSRF-Token", csrf_token)
            .json(payload);
        let response = self.send(request, self.timeout).await?;

        // The body is informational; an empty or non-JSON body is still a success
        let body = response.text().await.unwrap_or_default();
        Ok(ReportConfirmation {
            report_id: report_id_from(&body),
            submitted_at: Utc::now(),
        })
    }
}

fn report_id_from(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let id = value
        .get("id")
        .or_else(|| value.get("reportId"))
        .or_else(|| value.get("report").and_then(|r| r.get("id")))?;
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_id_shapes() {
        assert_eq!(report_id_from(r#"{"id": "r-1"}"#), Some("r-1".to_string()));
        assert_eq!(report_id_from(r#"{"reportId": 42}"#), Some("42".to_string()));
        assert_eq!(
            report_id_from(r#"{"report": {"id": "r-2"}}"#),
            Some("r-2".to_string())
        );
        assert_eq!(report_id_from(""), None);
        assert_eq!(report_id_from(r#"{"ok": true}"#), None);
    }

    #[test]
    fn test_upload_url_request_shape() {
        let target = SpotTarget::parse("Ireland#Donegal#Bundoran").unwrap();
        let body = UploadUrlRequest {
            country: &target.country,
            region: &target.region,
            spot: &target.spot,
            media_type: ArtifactKind::VideoThumbnail.storage_type(),
        };
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["mediaType"], "image");
        assert_eq!(value["spot"], "Bundoran");
    }
}
