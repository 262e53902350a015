//! Seams between the coordinators and the network
//!
//! [`crate::ApiClient`] implements every trait here; tests substitute fakes.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use spotreport_core::models::{ArtifactKind, MediaKind, ReportPayload, SpotTarget, UploadTicket};
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Anti-forgery token refused.
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }
}

/// Server acknowledgement of a submitted report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportConfirmation {
    pub report_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Presigned-URL issuance and blob transfer.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn request_upload_url(
        &self,
        target: &SpotTarget,
        kind: ArtifactKind,
    ) -> Result<UploadTicket, TransportError>;

    /// PUT `data` to the ticket's URL. Only HTTP 200 counts as success.
    async fn put_blob(
        &self,
        ticket: &UploadTicket,
        data: Bytes,
        timeout: Duration,
    ) -> Result<(), TransportError>;
}

#[async_trait]
pub trait DeletionTransport: Send + Sync {
    async fn delete_media(&self, remote_key: &str, storage_type: MediaKind)
        -> Result<(), TransportError>;
}

/// Source of fresh anti-forgery tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<String, TransportError>;
}

#[async_trait]
pub trait ReportTransport: Send + Sync {
    async fn post_report(
        &self,
        payload: &ReportPayload,
        csrf_token: &str,
    ) -> Result<ReportConfirmation, TransportError>;
}
