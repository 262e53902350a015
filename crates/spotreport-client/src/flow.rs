//! One report from media selection to submission or abandonment
//!
//! [`ReportFlow`] runs each selection through timestamp extraction,
//! relevance validation and compression, hands the result to the
//! [`UploadCoordinator`], and submits or cleans up at the end. Callers watch
//! [`FlowState`] through [`ReportFlow::subscribe`].

use serde::Serialize;
use serde_json::Value;
use spotreport_core::models::{
    ArtifactKind, MediaKind, MediaSelection, ReportDraft, SelectionSummary, SpotTarget,
    UploadSnapshot, ValidationResult,
};
use spotreport_core::{Observable, PipelineConfig, PipelineError};
use spotreport_processing::{
    AssetStore, ContentClassifier, ContentValidator, MediaTranscoder, MetadataExtractor,
    VideoProbe,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::cleanup::{CleanupCoordinator, CleanupSummary};
use crate::error::{FlowError, SubmissionError};
use crate::manifest::CleanupManifest;
use crate::submission::SubmissionManager;
use crate::transport::{
    DeletionTransport, ReportConfirmation, ReportTransport, TokenProvider, UploadTransport,
};
use crate::upload::{PreparationGuard, UploadCoordinator, UploadTimeouts};
use crate::ApiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPhase {
    Editing,
    Submitting,
    Submitted,
    Abandoned,
}

/// Everything an observer needs to render the report form.
#[derive(Debug, Clone, Serialize)]
pub struct FlowState {
    pub phase: FlowPhase,
    pub target: Option<SpotTarget>,
    pub image: Option<SelectionSummary>,
    pub image_validation: Option<ValidationResult>,
    pub video: Option<SelectionSummary>,
    pub video_validation: Option<ValidationResult>,
    pub uploads: UploadSnapshot,
    pub confirmation: Option<ReportConfirmation>,
    pub last_error: Option<String>,
}

impl Default for FlowState {
    fn default() -> Self {
        Self {
            phase: FlowPhase::Editing,
            target: None,
            image: None,
            image_validation: None,
            video: None,
            video_validation: None,
            uploads: UploadSnapshot::default(),
            confirmation: None,
            last_error: None,
        }
    }
}

impl FlowState {
    fn set_selection(&mut self, kind: MediaKind, summary: Option<SelectionSummary>) {
        match kind {
            MediaKind::Image => self.image = summary,
            MediaKind::Video => self.video = summary,
        }
    }

    fn set_validation(&mut self, kind: MediaKind, validation: Option<ValidationResult>) {
        match kind {
            MediaKind::Image => self.image_validation = validation,
            MediaKind::Video => self.video_validation = validation,
        }
    }
}

/// Collaborators injected into a [`ReportFlow`].
pub struct FlowDependencies {
    pub uploads: Arc<dyn UploadTransport>,
    pub deletions: Arc<dyn DeletionTransport>,
    pub tokens: Arc<dyn TokenProvider>,
    pub reports: Arc<dyn ReportTransport>,
    pub classifier: Arc<dyn ContentClassifier>,
    pub transcoder: MediaTranscoder,
    pub metadata: MetadataExtractor,
}

impl FlowDependencies {
    /// Production wiring: [`ApiClient`] for every endpoint, the configured
    /// classifier, mozjpeg and FFmpeg for processing.
    pub fn from_config(
        config: &PipelineConfig,
        asset_store: Option<Arc<dyn AssetStore>>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let api = Arc::new(ApiClient::from_config(config)?);
        let classifier = spotreport_plugins::classifier_from_config(config)?;
        let transcoder = MediaTranscoder::with_defaults(&config.ffmpeg_path)?
            .with_thumbnail_max_dimension(config.thumbnail_max_dimension);

        let video_probe = match VideoProbe::new(&config.ffprobe_path) {
            Ok(probe) => Some(probe),
            Err(e) => {
                tracing::warn!(error = %e, "ffprobe unavailable, video capture dates disabled");
                None
            }
        };

        Ok(Self {
            uploads: api.clone(),
            deletions: api.clone(),
            tokens: api.clone(),
            reports: api,
            classifier,
            transcoder,
            metadata: MetadataExtractor::new(asset_store, video_probe),
        })
    }
}

pub struct ReportFlow {
    uploads: UploadCoordinator,
    submission: SubmissionManager,
    cleanup: CleanupCoordinator,
    validator: ContentValidator,
    transcoder: MediaTranscoder,
    metadata: MetadataExtractor,
    byte_budget: usize,
    thumbnail_offset_secs: f64,
    draft: Mutex<ReportDraft>,
    state: Arc<Observable<FlowState>>,
    forwarder: JoinHandle<()>,
}

impl ReportFlow {
    /// Must be called from within a tokio runtime.
    pub fn new(deps: FlowDependencies, config: &PipelineConfig) -> Self {
        let manifest = CleanupManifest::new();
        let uploads = UploadCoordinator::new(
            deps.uploads,
            manifest.clone(),
            UploadTimeouts::from_config(config),
        );
        let submission = SubmissionManager::new(deps.tokens, deps.reports, manifest.clone())
            .with_upload_state(uploads.subscribe());
        let cleanup = CleanupCoordinator::new(deps.deletions, manifest);

        let state = Arc::new(Observable::new(FlowState::default()));
        let forwarder = spawn_upload_forwarder(uploads.subscribe(), state.clone());

        Self {
            uploads,
            submission,
            cleanup,
            validator: ContentValidator::new(deps.classifier),
            transcoder: deps.transcoder,
            metadata: deps.metadata,
            byte_budget: config.image_byte_budget,
            thumbnail_offset_secs: config.thumbnail_offset_secs,
            draft: Mutex::new(ReportDraft::new()),
            state,
            forwarder,
        }
    }

    pub fn state(&self) -> FlowState {
        let mut state = self.state.snapshot();
        state.uploads = self.uploads.snapshot();
        state
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    /// Current draft, with whatever uploads have completed so far.
    pub async fn draft(&self) -> ReportDraft {
        let mut draft = self.draft.lock().await.clone();
        draft.attach_uploads(&self.uploads.snapshot());
        draft
    }

    /// Wait until no upload is running or queued.
    pub async fn settled(&self) -> FlowState {
        self.uploads.settled().await;
        self.state()
    }

    /// Timestamp, validate, compress and stage a photo.
    ///
    /// A rejected photo is not staged; the result says why.
    #[tracing::instrument(skip(self, selection), fields(size = selection.data().len()))]
    pub async fn select_image(
        &self,
        mut selection: MediaSelection,
    ) -> Result<ValidationResult, FlowError> {
        let _preparing = self.begin_preparing()?;
        Self::ensure_kind(&selection, MediaKind::Image)?;
        self.record(self.uploads.clear(MediaKind::Image))?;
        self.publish_selection(&selection, None);

        self.record_capture_time(&mut selection).await;
        let validation = self
            .validator
            .validate(selection.data(), MediaKind::Image)
            .await;
        self.publish_selection(&selection, Some(validation.clone()));
        if !validation.passed {
            return Ok(validation);
        }

        let outcome = self.record(
            self.transcoder
                .compress_async(selection.data().clone(), self.byte_budget)
                .await
                .map_err(|e| PipelineError::Encoding(e.to_string())),
        )?;
        tracing::debug!(
            original = selection.data().len(),
            compressed = outcome.len(),
            quality = outcome.final_quality,
            resized = outcome.resized,
            "Image compressed"
        );

        self.ensure_editing()?;
        self.record(self.uploads.stage_image(outcome.data))?;
        Ok(validation)
    }

    /// Timestamp, thumbnail, validate and stage a clip.
    ///
    /// The classifier judges the thumbnail when one could be extracted, the
    /// raw clip otherwise.
    #[tracing::instrument(skip(self, selection), fields(size = selection.data().len()))]
    pub async fn select_video(
        &self,
        mut selection: MediaSelection,
    ) -> Result<ValidationResult, FlowError> {
        let _preparing = self.begin_preparing()?;
        Self::ensure_kind(&selection, MediaKind::Video)?;
        self.record(self.uploads.clear(MediaKind::Video))?;
        self.publish_selection(&selection, None);

        self.record_capture_time(&mut selection).await;
        let thumbnail = self
            .transcoder
            .generate_thumbnail(&mut selection, self.thumbnail_offset_secs)
            .await;

        let validation = match &thumbnail {
            Some(frame) => self.validator.validate(frame, MediaKind::Video).await,
            None => {
                self.validator
                    .validate(selection.data(), MediaKind::Video)
                    .await
            }
        };
        selection.clear_staged_file();
        self.publish_selection(&selection, Some(validation.clone()));
        if !validation.passed {
            return Ok(validation);
        }

        self.ensure_editing()?;
        self.record(
            self.uploads
                .stage_video(selection.data().clone(), thumbnail),
        )?;
        Ok(validation)
    }

    pub async fn set_target(&self, raw: &str) -> Result<SpotTarget, FlowError> {
        self.ensure_editing()?;
        let target = self.record(self.uploads.set_target(raw))?;
        self.draft.lock().await.target = Some(target.clone());
        self.state.update(|s| s.target = Some(target.clone()));
        Ok(target)
    }

    pub async fn set_field(&self, name: &str, value: Value) -> Result<(), FlowError> {
        self.ensure_editing()?;
        self.draft.lock().await.set_field(name, value)?;
        Ok(())
    }

    /// Drop a selection. An already uploaded copy is deleted on abandonment.
    pub fn clear_selection(&self, kind: MediaKind) -> Result<(), FlowError> {
        self.ensure_editing()?;
        self.record(self.uploads.clear(kind))?;
        self.state.update(|s| {
            s.set_selection(kind, None);
            s.set_validation(kind, None);
        });
        Ok(())
    }

    pub fn retry_upload(&self, kind: ArtifactKind) -> Result<(), FlowError> {
        self.ensure_editing()?;
        self.record(self.uploads.retry(kind))?;
        Ok(())
    }

    /// Submit the report with the keys of every completed upload.
    pub async fn submit(&self) -> Result<ReportConfirmation, FlowError> {
        self.ensure_editing()?;

        let draft = {
            let mut draft = self.draft.lock().await;
            if draft.target.is_none() {
                return Err(self.fail(PipelineError::InvalidState(
                    "a target spot is required before submitting".to_string(),
                )));
            }
            draft.attach_uploads(&self.uploads.snapshot());
            draft.clone()
        };

        self.state.update(|s| s.phase = FlowPhase::Submitting);
        match self.submission.submit(&draft).await {
            Ok(confirmation) => {
                self.state.update(|s| {
                    s.phase = FlowPhase::Submitted;
                    s.confirmation = Some(confirmation.clone());
                    s.last_error = None;
                });
                Ok(confirmation)
            }
            Err(e) => {
                self.state.update(|s| s.phase = FlowPhase::Editing);
                Err(self.fail(e))
            }
        }
    }

    /// Abandon the report: refuse new media, wait for selections and uploads
    /// in progress, then delete every uploaded key.
    ///
    /// Refused while a submission is running. Once the report is submitted
    /// this deletes nothing and returns a skipped summary.
    pub async fn cancel(&self) -> Result<CleanupSummary, FlowError> {
        if self.state.snapshot().phase == FlowPhase::Submitting {
            return Err(SubmissionError::InProgress.into());
        }

        self.uploads.close();
        self.uploads.settled().await;
        let summary = self.cleanup.cleanup_if_abandoned().await;
        if !summary.skipped {
            self.state.update(|s| s.phase = FlowPhase::Abandoned);
        }
        Ok(summary)
    }

    fn ensure_editing(&self) -> Result<(), FlowError> {
        match self.state.snapshot().phase {
            FlowPhase::Editing => Ok(()),
            FlowPhase::Submitting => Err(SubmissionError::InProgress.into()),
            FlowPhase::Submitted | FlowPhase::Abandoned => Err(FlowError::Finished),
        }
    }

    /// Counted as busy before the phase is checked, so a concurrent submit
    /// either is seen here or sees this selection in flight.
    fn begin_preparing(&self) -> Result<PreparationGuard, FlowError> {
        self.ensure_editing()?;
        let guard = self
            .uploads
            .begin_preparing()
            .map_err(|_| FlowError::Finished)?;
        self.ensure_editing()?;
        Ok(guard)
    }

    fn ensure_kind(selection: &MediaSelection, expected: MediaKind) -> Result<(), FlowError> {
        if selection.kind() != expected {
            return Err(PipelineError::InvalidState(format!(
                "expected a {} selection, got {}",
                expected,
                selection.kind()
            ))
            .into());
        }
        Ok(())
    }

    async fn record_capture_time(&self, selection: &mut MediaSelection) {
        let extracted = self.metadata.resolve_timestamp(selection).await;
        self.draft.lock().await.capture_timestamp = Some(extracted.timestamp);
    }

    fn publish_selection(&self, selection: &MediaSelection, validation: Option<ValidationResult>) {
        let kind = selection.kind();
        let summary = selection.summary();
        self.state.update(|s| {
            s.set_selection(kind, Some(summary));
            s.set_validation(kind, validation);
        });
    }

    /// Publish the error of a failed step as `last_error`.
    fn record<T, E: Into<FlowError>>(&self, result: Result<T, E>) -> Result<T, FlowError> {
        result.map_err(|e| self.fail(e))
    }

    fn fail(&self, err: impl Into<FlowError>) -> FlowError {
        let err = err.into();
        tracing::debug!(error = %err, "Flow step failed");
        self.state.update(|s| s.last_error = Some(err.to_string()));
        err
    }
}

impl Drop for ReportFlow {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

fn spawn_upload_forwarder(
    mut uploads: watch::Receiver<UploadSnapshot>,
    state: Arc<Observable<FlowState>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while uploads.changed().await.is_ok() {
            let snapshot = uploads.borrow_and_update().clone();
            state.update(|s| s.uploads = snapshot);
        }
    })
}
