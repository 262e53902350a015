//! Report submission with anti-forgery token handling

use spotreport_core::models::{ReportDraft, UploadSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::error::SubmissionError;
use crate::manifest::CleanupManifest;
use crate::transport::{ReportConfirmation, ReportTransport, TokenProvider};

/// Submits reports, caching the anti-forgery token between attempts.
///
/// On success the cleanup manifest is cleared and sealed in one step, so a
/// later cleanup never deletes media the report references.
pub struct SubmissionManager {
    tokens: Arc<dyn TokenProvider>,
    reports: Arc<dyn ReportTransport>,
    manifest: CleanupManifest,
    upload_state: Option<watch::Receiver<UploadSnapshot>>,
    cached_token: Mutex<Option<String>>,
    in_progress: AtomicBool,
}

struct InProgressGuard<'a>(&'a AtomicBool);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SubmissionManager {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        reports: Arc<dyn ReportTransport>,
        manifest: CleanupManifest,
    ) -> Self {
        Self {
            tokens,
            reports,
            manifest,
            upload_state: None,
            cached_token: Mutex::new(None),
            in_progress: AtomicBool::new(false),
        }
    }

    /// Refuse to submit while these uploads are running or queued.
    pub fn with_upload_state(mut self, upload_state: watch::Receiver<UploadSnapshot>) -> Self {
        self.upload_state = Some(upload_state);
        self
    }

    pub fn is_submitted(&self) -> bool {
        self.manifest.is_submitted()
    }

    #[tracing::instrument(skip(self, draft), fields(report_id = %draft.id))]
    pub async fn submit(&self, draft: &ReportDraft) -> Result<ReportConfirmation, SubmissionError> {
        self.check_submittable()?;

        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SubmissionError::InProgress);
        }
        let _in_progress = InProgressGuard(&self.in_progress);

        // Held for the whole exchange so cleanup cannot interleave
        let _gate = self.manifest.exclusive().await;
        self.check_submittable()?;

        let payload = draft.to_payload();
        tracing::debug!(
            media_type = ?payload.media_type,
            keys = draft.remote_keys().len(),
            "Submitting report"
        );

        let token = self.token(false).await?;
        let confirmation = match self.reports.post_report(&payload, &token).await {
            Ok(confirmation) => confirmation,
            Err(e) if e.is_forbidden() => {
                tracing::info!("Anti-forgery token refused, refreshing once");
                let token = self.token(true).await?;
                match self.reports.post_report(&payload, &token).await {
                    Ok(confirmation) => confirmation,
                    Err(e) if e.is_forbidden() => return Err(SubmissionError::Forbidden),
                    Err(e) => return Err(SubmissionError::Transport(e)),
                }
            }
            Err(e) => return Err(SubmissionError::Transport(e)),
        };

        let released = self.manifest.mark_submitted();
        tracing::info!(
            report_id = ?confirmation.report_id,
            released = released.len(),
            "Report submitted"
        );
        Ok(confirmation)
    }

    fn check_submittable(&self) -> Result<(), SubmissionError> {
        if self.manifest.is_submitted() {
            return Err(SubmissionError::AlreadySubmitted);
        }
        if self.manifest.is_abandoned() {
            return Err(SubmissionError::Abandoned);
        }
        if let Some(state) = &self.upload_state {
            if state.borrow().is_busy() {
                return Err(SubmissionError::UploadsInFlight);
            }
        }
        Ok(())
    }

    async fn token(&self, refresh: bool) -> Result<String, SubmissionError> {
        let mut cached = self.cached_token.lock().await;
        if !refresh {
            if let Some(token) = cached.as_ref() {
                return Ok(token.clone());
            }
        }

        let token = self
            .tokens
            .fetch_token()
            .await
            .map_err(SubmissionError::Token)?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

impl std::fmt::Debug for SubmissionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionManager")
            .field("submitted", &self.manifest.is_submitted())
            .finish()
    }
}
