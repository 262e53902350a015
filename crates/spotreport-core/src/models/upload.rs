use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::ArtifactKind;
use crate::error::PipelineError;

/// Presigned upload authorization for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTicket {
    pub artifact_kind: ArtifactKind,
    pub remote_key: String,
    pub upload_url: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UploadTicket {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

/// Per-artifact upload state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    #[default]
    Idle,
    Requesting,
    Transferring,
    Completed,
    Failed,
}

impl UploadState {
    /// Allowed edges. `Failed -> Idle` is a caller retry and `Completed -> Idle`
    /// a replaced or cleared selection; everything else moves forward only.
    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Idle, Requesting)
                | (Requesting, Transferring)
                | (Requesting, Failed)
                | (Transferring, Completed)
                | (Transferring, Failed)
                | (Failed, Idle)
                | (Completed, Idle)
        )
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, UploadState::Requesting | UploadState::Transferring)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }

    /// Coarse progress published for this state.
    pub fn progress(self) -> f32 {
        match self {
            UploadState::Transferring => 0.5,
            UploadState::Completed => 1.0,
            _ => 0.0,
        }
    }
}

/// Observable status of one artifact.
///
/// `remote_key` is present exactly when the state is `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactStatus {
    pub kind: ArtifactKind,
    pub state: UploadState,
    pub progress: f32,
    pub remote_key: Option<String>,
    pub error: Option<String>,
}

impl ArtifactStatus {
    pub fn idle(kind: ArtifactKind) -> Self {
        Self {
            kind,
            state: UploadState::Idle,
            progress: 0.0,
            remote_key: None,
            error: None,
        }
    }

    /// Move to `next`, rejecting edges the state machine does not allow.
    pub fn transition(&mut self, next: UploadState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::InvalidState(format!(
                "{} upload cannot move from {:?} to {:?}",
                self.kind, self.state, next
            )));
        }

        self.state = next;
        self.progress = next.progress();
        match next {
            UploadState::Completed => self.error = None,
            UploadState::Failed => self.remote_key = None,
            UploadState::Idle => {
                self.remote_key = None;
                self.error = None;
            }
            UploadState::Requesting | UploadState::Transferring => {}
        }
        Ok(())
    }

    pub fn complete(&mut self, remote_key: String) -> Result<(), PipelineError> {
        self.transition(UploadState::Completed)?;
        self.remote_key = Some(remote_key);
        Ok(())
    }

    pub fn fail(&mut self, error: String) -> Result<(), PipelineError> {
        self.transition(UploadState::Failed)?;
        self.error = Some(error);
        Ok(())
    }
}

/// Snapshot of every artifact the coordinator tracks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSnapshot {
    pub image: ArtifactStatus,
    pub video: ArtifactStatus,
    pub video_thumbnail: ArtifactStatus,
    /// Upload jobs accepted but not yet finished, including a video waiting on its thumbnail
    pub pending_jobs: usize,
    /// Selections still being validated or compressed, not yet staged
    pub preparing: usize,
}

impl Default for UploadSnapshot {
    fn default() -> Self {
        Self {
            image: ArtifactStatus::idle(ArtifactKind::Image),
            video: ArtifactStatus::idle(ArtifactKind::Video),
            video_thumbnail: ArtifactStatus::idle(ArtifactKind::VideoThumbnail),
            pending_jobs: 0,
            preparing: 0,
        }
    }
}

impl UploadSnapshot {
    pub fn get(&self, kind: ArtifactKind) -> &ArtifactStatus {
        match kind {
            ArtifactKind::Image => &self.image,
            ArtifactKind::Video => &self.video,
            ArtifactKind::VideoThumbnail => &self.video_thumbnail,
        }
    }

    pub fn get_mut(&mut self, kind: ArtifactKind) -> &mut ArtifactStatus {
        match kind {
            ArtifactKind::Image => &mut self.image,
            ArtifactKind::Video => &mut self.video,
            ArtifactKind::VideoThumbnail => &mut self.video_thumbnail,
        }
    }

    /// True while any selection is being prepared or any transfer is running or queued.
    pub fn is_busy(&self) -> bool {
        self.preparing > 0
            || self.pending_jobs > 0
            || ArtifactKind::ALL.iter().any(|k| self.get(*k).state.is_in_flight())
    }

    pub fn completed_key(&self, kind: ArtifactKind) -> Option<&str> {
        let status = self.get(kind);
        match status.state {
            UploadState::Completed => status.remote_key.as_deref(),
            _ => None,
        }
    }

    /// Whether the user should be offered a retry for this artifact.
    pub fn needs_retry(&self, kind: ArtifactKind) -> bool {
        kind.is_user_visible() && self.get(kind).state == UploadState::Failed
    }
}
