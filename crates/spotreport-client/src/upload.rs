//! Upload coordination
//!
//! One canonical upload routine drives every artifact kind through
//! `Idle → Requesting → Transferring → Completed | Failed`. A transfer starts
//! as soon as both the prepared bytes and the target are known, whichever
//! arrives last, and exactly once per staging. A video job uploads its
//! thumbnail first; a failed thumbnail never blocks the video.

use bytes::Bytes;
use chrono::Utc;
use spotreport_core::models::{
    ArtifactKind, ArtifactStatus, MediaKind, SpotTarget, UploadSnapshot, UploadState, UploadTicket,
};
use spotreport_core::{Observable, PipelineConfig, PipelineError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

use crate::error::UploadError;
use crate::manifest::{CleanupManifest, ManifestEntry};
use crate::transport::{TransportError, UploadTransport};

const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_VIDEO_TIMEOUT_SECS: u64 = 120;

/// Per-artifact transfer deadlines, covering URL issuance and the PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTimeouts {
    /// Images and video thumbnails
    pub image: Duration,
    pub video: Duration,
}

impl Default for UploadTimeouts {
    fn default() -> Self {
        Self {
            image: Duration::from_secs(DEFAULT_IMAGE_TIMEOUT_SECS),
            video: Duration::from_secs(DEFAULT_VIDEO_TIMEOUT_SECS),
        }
    }
}

impl UploadTimeouts {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            image: config.image_upload_timeout,
            video: config.video_upload_timeout,
        }
    }

    pub fn for_kind(&self, kind: ArtifactKind) -> Duration {
        match kind {
            ArtifactKind::Video => self.video,
            ArtifactKind::Image | ArtifactKind::VideoThumbnail => self.image,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    data: Option<Bytes>,
    /// Claimed by a job; cleared on restage, retry and reset
    started: bool,
}

#[derive(Debug, Default)]
struct Staging {
    target: Option<SpotTarget>,
    image: Slot,
    video: Slot,
    video_thumbnail: Slot,
    /// Live ticket per artifact; a new ticket supersedes the old one
    tickets: HashMap<ArtifactKind, UploadTicket>,
}

impl Staging {
    fn slot(&self, kind: ArtifactKind) -> &Slot {
        match kind {
            ArtifactKind::Image => &self.image,
            ArtifactKind::Video => &self.video,
            ArtifactKind::VideoThumbnail => &self.video_thumbnail,
        }
    }

    fn slot_mut(&mut self, kind: ArtifactKind) -> &mut Slot {
        match kind {
            ArtifactKind::Image => &mut self.image,
            ArtifactKind::Video => &mut self.video,
            ArtifactKind::VideoThumbnail => &mut self.video_thumbnail,
        }
    }
}

struct Inner {
    transport: Arc<dyn UploadTransport>,
    manifest: CleanupManifest,
    state: Observable<UploadSnapshot>,
    staging: Mutex<Staging>,
    timeouts: UploadTimeouts,
}

/// Counts a selection as busy until it is staged or abandoned.
#[must_use = "the selection stops counting as busy when the guard drops"]
pub struct PreparationGuard {
    coordinator: UploadCoordinator,
}

impl Drop for PreparationGuard {
    fn drop(&mut self) {
        self.coordinator
            .inner
            .state
            .update(|s| s.preparing = s.preparing.saturating_sub(1));
    }
}

/// Owns the upload state of one report flow.
///
/// Cheap to clone; clones share state. Staging and retry spawn tokio tasks
/// and must be called from within a runtime.
#[derive(Clone)]
pub struct UploadCoordinator {
    inner: Arc<Inner>,
}

impl UploadCoordinator {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        manifest: CleanupManifest,
        timeouts: UploadTimeouts,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                manifest,
                state: Observable::new(UploadSnapshot::default()),
                staging: Mutex::new(Staging::default()),
                timeouts,
            }),
        }
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        self.inner.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn manifest(&self) -> &CleanupManifest {
        &self.inner.manifest
    }

    pub fn target(&self) -> Option<SpotTarget> {
        self.lock_staging().target.clone()
    }

    /// The ticket currently authorizing `kind`, if any.
    pub fn live_ticket(&self, kind: ArtifactKind) -> Option<UploadTicket> {
        self.lock_staging().tickets.get(&kind).cloned()
    }

    /// Wait until no selection is being prepared and no upload is running or queued.
    pub async fn settled(&self) -> UploadSnapshot {
        self.inner.state.wait_for(|s| !s.is_busy()).await
    }

    /// Mark a selection as being prepared for staging.
    ///
    /// Submission is refused and [`settled`](Self::settled) keeps waiting
    /// until the returned guard drops.
    pub fn begin_preparing(&self) -> Result<PreparationGuard, UploadError> {
        let staging = self.lock_staging();
        self.ensure_open()?;
        self.inner.state.update(|s| s.preparing += 1);
        drop(staging);
        Ok(PreparationGuard {
            coordinator: self.clone(),
        })
    }

    /// Accept no new staging, retry or preparation from now on.
    ///
    /// Jobs already claimed still run; wait for them with
    /// [`settled`](Self::settled) before cleaning up.
    pub fn close(&self) {
        let _staging = self.lock_staging();
        self.inner.manifest.abandon();
        tracing::debug!("Upload coordinator closed");
    }

    /// Parse and record the target context, starting any staged upload.
    ///
    /// A malformed identifier is rejected before any network call.
    pub fn set_target(&self, raw: &str) -> Result<SpotTarget, UploadError> {
        let target = SpotTarget::parse(raw)?;

        let jobs = {
            let mut staging = self.lock_staging();
            staging.target = Some(target.clone());
            [ArtifactKind::Image, ArtifactKind::Video]
                .into_iter()
                .filter_map(|kind| self.claim_job(&mut staging, kind))
                .collect::<Vec<_>>()
        };

        tracing::debug!(target = %target, jobs = jobs.len(), "Target set");
        self.launch(jobs);
        Ok(target)
    }

    /// Stage a compressed image, replacing any previous one.
    pub fn stage_image(&self, data: Bytes) -> Result<(), UploadError> {
        let job = {
            let mut staging = self.lock_staging();
            self.ensure_open()?;
            self.ensure_not_busy(&staging, &[ArtifactKind::Image])?;
            self.reset_artifact(&mut staging, ArtifactKind::Image);
            staging.image.data = Some(data);
            self.claim_job(&mut staging, ArtifactKind::Image)
        };

        self.launch(job.into_iter().collect());
        Ok(())
    }

    /// Stage a video and its optional thumbnail, replacing any previous ones.
    pub fn stage_video(&self, video: Bytes, thumbnail: Option<Bytes>) -> Result<(), UploadError> {
        let job = {
            let mut staging = self.lock_staging();
            self.ensure_open()?;
            self.ensure_not_busy(&staging, &[ArtifactKind::Video, ArtifactKind::VideoThumbnail])?;
            self.reset_artifact(&mut staging, ArtifactKind::Video);
            self.reset_artifact(&mut staging, ArtifactKind::VideoThumbnail);
            staging.video.data = Some(video);
            staging.video_thumbnail.data = thumbnail;
            self.claim_job(&mut staging, ArtifactKind::Video)
        };

        self.launch(job.into_iter().collect());
        Ok(())
    }

    /// Drop the staged media of `kind`. Completed keys stay in the manifest.
    pub fn clear(&self, kind: MediaKind) -> Result<(), UploadError> {
        let kinds: &[ArtifactKind] = match kind {
            MediaKind::Image => &[ArtifactKind::Image],
            MediaKind::Video => &[ArtifactKind::Video, ArtifactKind::VideoThumbnail],
        };

        let mut staging = self.lock_staging();
        self.ensure_not_busy(&staging, kinds)?;
        for artifact in kinds {
            self.reset_artifact(&mut staging, *artifact);
        }
        Ok(())
    }

    /// Re-run a failed upload with a fresh ticket.
    pub fn retry(&self, kind: ArtifactKind) -> Result<(), UploadError> {
        let job = {
            let mut staging = self.lock_staging();
            self.ensure_open()?;
            let state = self.inner.state.snapshot().get(kind).state;
            if state != UploadState::Failed {
                return Err(UploadError::NotRetryable { kind, state });
            }

            self.rearm(&mut staging, kind)?;
            if kind == ArtifactKind::Video {
                let thumbnail = self.inner.state.snapshot().video_thumbnail.state;
                if thumbnail == UploadState::Failed {
                    self.rearm(&mut staging, ArtifactKind::VideoThumbnail)?;
                }
            }
            self.claim_job(&mut staging, kind)
        };

        tracing::info!(artifact = %kind, "Retrying upload");
        self.launch(job.into_iter().collect());
        Ok(())
    }

    /// Forget every staged artifact and the target.
    pub fn reset(&self) -> Result<(), UploadError> {
        let mut staging = self.lock_staging();
        self.ensure_not_busy(&staging, &ArtifactKind::ALL)?;
        *staging = Staging::default();
        let preparing = self.inner.state.snapshot().preparing;
        self.inner.state.replace(UploadSnapshot {
            preparing,
            ..UploadSnapshot::default()
        });
        Ok(())
    }

    fn lock_staging(&self) -> MutexGuard<'_, Staging> {
        self.inner.staging.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Callers hold the staging lock so [`close`](Self::close) cannot interleave.
    fn ensure_open(&self) -> Result<(), UploadError> {
        if self.inner.manifest.is_closed() {
            return Err(UploadError::Closed);
        }
        Ok(())
    }

    fn ensure_not_busy(&self, staging: &Staging, kinds: &[ArtifactKind]) -> Result<(), UploadError> {
        let snapshot = self.inner.state.snapshot();
        for kind in kinds {
            let state = snapshot.get(*kind).state;
            let queued = staging.slot(*kind).started && state == UploadState::Idle;
            if state.is_in_flight() || queued {
                return Err(UploadError::Busy(*kind));
            }
        }
        Ok(())
    }

    fn reset_artifact(&self, staging: &mut Staging, kind: ArtifactKind) {
        let slot = staging.slot_mut(kind);
        slot.data = None;
        slot.started = false;
        staging.tickets.remove(&kind);

        self.inner.state.update(|s| {
            let status = s.get_mut(kind);
            if status.state.is_terminal() {
                if let Some(key) = &status.remote_key {
                    tracing::debug!(artifact = %kind, remote_key = %key, "Completed upload replaced");
                }
                *status = ArtifactStatus::idle(kind);
            }
        });
    }

    fn rearm(&self, staging: &mut Staging, kind: ArtifactKind) -> Result<(), UploadError> {
        staging.slot_mut(kind).started = false;
        staging.tickets.remove(&kind);
        self.transition(kind, UploadState::Idle)
    }

    /// Claim the job that uploads `kind` if it is ready and unclaimed.
    fn claim_job(&self, staging: &mut Staging, kind: ArtifactKind) -> Option<Vec<ArtifactKind>> {
        staging.target.as_ref()?;
        if self.inner.manifest.is_closed() {
            return None;
        }

        let snapshot = self.inner.state.snapshot();
        let ready = |staging: &Staging, k: ArtifactKind| {
            let slot = staging.slot(k);
            slot.data.is_some() && !slot.started && snapshot.get(k).state == UploadState::Idle
        };

        if !ready(staging, kind) {
            return None;
        }

        let mut job = Vec::with_capacity(2);
        if kind == ArtifactKind::Video && ready(staging, ArtifactKind::VideoThumbnail) {
            job.push(ArtifactKind::VideoThumbnail);
        }
        job.push(kind);

        for k in &job {
            staging.slot_mut(*k).started = true;
        }
        self.inner.state.update(|s| s.pending_jobs += 1);
        Some(job)
    }

    fn launch(&self, jobs: Vec<Vec<ArtifactKind>>) {
        for job in jobs {
            let coordinator = self.clone();
            tokio::spawn(async move {
                coordinator.run_job(job).await;
            });
        }
    }

    async fn run_job(&self, job: Vec<ArtifactKind>) {
        for kind in job {
            match self.upload_artifact(kind).await {
                Ok(_) => {}
                Err(e) if kind == ArtifactKind::VideoThumbnail => {
                    tracing::info!(error = %e, "Thumbnail upload failed, continuing with video");
                }
                Err(e) => {
                    tracing::warn!(artifact = %kind, error = %e, "Upload failed");
                }
            }
        }
        self.inner
            .state
            .update(|s| s.pending_jobs = s.pending_jobs.saturating_sub(1));
    }

    #[tracing::instrument(skip(self), fields(artifact = %kind))]
    async fn upload_artifact(&self, kind: ArtifactKind) -> Result<String, UploadError> {
        let (target, data) = {
            let staging = self.lock_staging();
            (staging.target.clone(), staging.slot(kind).data.clone())
        };
        let (Some(target), Some(data)) = (target, data) else {
            return Err(PipelineError::InvalidState(format!("{} is not staged", kind)).into());
        };

        self.transition(kind, UploadState::Requesting)?;

        let timeout = self.inner.timeouts.for_kind(kind);
        let result = match tokio::time::timeout(timeout, self.transfer(kind, &target, data, timeout))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        match result {
            Ok(remote_key) => {
                self.inner
                    .manifest
                    .record(ManifestEntry::new(remote_key.clone(), kind));
                self.inner
                    .state
                    .update(|s| s.get_mut(kind).complete(remote_key.clone()))?;
                tracing::info!(remote_key = %remote_key, "Upload completed");
                Ok(remote_key)
            }
            Err(source) => {
                self.lock_staging().tickets.remove(&kind);
                self.inner
                    .state
                    .update(|s| s.get_mut(kind).fail(source.to_string()))?;
                Err(UploadError::Transport { kind, source })
            }
        }
    }

    async fn transfer(
        &self,
        kind: ArtifactKind,
        target: &SpotTarget,
        data: Bytes,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let ticket = self.inner.transport.request_upload_url(target, kind).await?;
        if ticket.is_expired(Utc::now()) {
            return Err(TransportError::InvalidResponse(format!(
                "upload URL for {} expired before the transfer started",
                ticket.remote_key
            )));
        }
        let remote_key = ticket.remote_key.clone();

        self.lock_staging().tickets.insert(kind, ticket.clone());
        self.transition(kind, UploadState::Transferring)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        tracing::debug!(remote_key = %remote_key, size = data.len(), "Transferring");
        self.inner.transport.put_blob(&ticket, data, timeout).await?;
        Ok(remote_key)
    }

    fn transition(&self, kind: ArtifactKind, next: UploadState) -> Result<(), UploadError> {
        self.inner
            .state
            .update(|s| s.get_mut(kind).transition(next))
            .map_err(UploadError::from)
    }
}
