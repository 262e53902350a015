//! HTTP client and coordinators for spot report media.
//!
//! [`ApiClient`] talks to the report API and implements the transport traits.
//! [`UploadCoordinator`], [`SubmissionManager`] and [`CleanupCoordinator`] run
//! the upload, submission and abandonment-cleanup stages; [`ReportFlow`]
//! wires them together for one report.

pub mod api;
pub mod cleanup;
pub mod error;
pub mod flow;
pub mod manifest;
pub mod submission;
pub mod transport;
pub mod upload;

#[cfg(test)]
mod test_helpers;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use spotreport_core::PipelineConfig;
use std::time::Duration;

/// Authentication strategy for the API.
#[derive(Clone, Debug)]
pub enum Auth {
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// `Cookie: {name=value}`
    SessionCookie(String),
    None,
}

/// HTTP client for the report API with configurable auth.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_prefix: String,
    auth: Auth,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: String, api_version: &str, auth: Auth, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix: format!("/api/{}", api_version),
            auth,
            timeout,
        })
    }

    /// Session cookie auth when configured, anonymous otherwise.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let auth = match &config.session_cookie {
            Some(cookie) => Auth::SessionCookie(cookie.clone()),
            None => Auth::None,
        };
        Self::new(
            config.api_base_url.clone(),
            &config.api_version,
            auth,
            config.api_request_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.header("Authorization", format!("Bearer {}", token)),
            Auth::SessionCookie(cookie) => request.header("Cookie", cookie.as_str()),
            Auth::None => request,
        }
    }

    /// Authenticated request against an API path.
    pub(crate) fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.apply_auth(self.client.request(method, self.build_url(path)))
    }

    /// Send and require a 2xx status.
    pub(crate) async fn send(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Send and deserialize a JSON response.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = self.send(request, self.timeout).await?;
        response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }

    /// Raw client for requests outside the API, such as presigned URLs.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Network(err.to_string())
    }
}

pub use cleanup::{CleanupCoordinator, CleanupSummary};
pub use error::{FlowError, SubmissionError, UploadError};
pub use flow::{FlowDependencies, FlowPhase, FlowState, ReportFlow};
pub use manifest::{CleanupManifest, ManifestEntry};
pub use submission::SubmissionManager;
pub use transport::{
    DeletionTransport, ReportConfirmation, ReportTransport, TokenProvider, TransportError,
    UploadTransport,
};
pub use upload::{PreparationGuard, UploadCoordinator, UploadTimeouts};
