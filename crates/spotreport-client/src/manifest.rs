//! Remote keys uploaded but not yet referenced by a submitted report

use spotreport_core::models::{ArtifactKind, MediaKind};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub remote_key: String,
    pub artifact_kind: ArtifactKind,
}

impl ManifestEntry {
    pub fn new(remote_key: impl Into<String>, artifact_kind: ArtifactKind) -> Self {
        Self {
            remote_key: remote_key.into(),
            artifact_kind,
        }
    }

    /// Storage routing type used by the deletion endpoint.
    pub fn storage_type(&self) -> MediaKind {
        self.artifact_kind.storage_type()
    }
}

#[derive(Debug, Default)]
struct ManifestState {
    entries: Vec<ManifestEntry>,
    /// Set once the report is submitted; from then on nothing is recorded or drained
    submitted: bool,
    /// Set once cleanup started; no new upload may be staged afterwards
    abandoned: bool,
}

/// Shared handle to the cleanup manifest of one report flow.
///
/// Uploads record into it, submission clears and seals it, cleanup drains it.
/// `gate` serializes submission against cleanup so a key is never deleted
/// while a request referencing it is on the wire.
#[derive(Debug, Clone, Default)]
pub struct CleanupManifest {
    state: Arc<Mutex<ManifestState>>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl CleanupManifest {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManifestState> {
        // A poisoned lock only means a panic elsewhere; the entries are still valid
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a completed upload. Returns `false` once the report is submitted.
    pub fn record(&self, entry: ManifestEntry) -> bool {
        let mut state = self.lock();
        if state.submitted {
            tracing::warn!(remote_key = %entry.remote_key, "Upload completed after submission");
            return false;
        }
        if !state.entries.contains(&entry) {
            tracing::debug!(
                remote_key = %entry.remote_key,
                artifact = %entry.artifact_kind,
                "Recorded in cleanup manifest"
            );
            state.entries.push(entry);
        }
        true
    }

    pub fn contains(&self, remote_key: &str) -> bool {
        self.lock().entries.iter().any(|e| e.remote_key == remote_key)
    }

    pub fn entries(&self) -> Vec<ManifestEntry> {
        self.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn is_submitted(&self) -> bool {
        self.lock().submitted
    }

    pub fn is_abandoned(&self) -> bool {
        self.lock().abandoned
    }

    /// Submitted or abandoned: the flow accepts no new media.
    pub fn is_closed(&self) -> bool {
        let state = self.lock();
        state.submitted || state.abandoned
    }

    /// Refuse new media from now on. Completed uploads are still recorded so
    /// a later cleanup deletes them.
    pub fn abandon(&self) {
        self.lock().abandoned = true;
    }

    /// Clear every entry and mark the report submitted, in one step.
    pub fn mark_submitted(&self) -> Vec<ManifestEntry> {
        let mut state = self.lock();
        state.submitted = true;
        std::mem::take(&mut state.entries)
    }

    /// Take every entry unless the report was submitted, abandoning the report.
    pub fn drain_unless_submitted(&self) -> Option<Vec<ManifestEntry>> {
        let mut state = self.lock();
        if state.submitted {
            return None;
        }
        state.abandoned = true;
        Some(std::mem::take(&mut state.entries))
    }

    /// Hold while submitting or cleaning up.
    pub(crate) async fn exclusive(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_deduplicated() {
        let manifest = CleanupManifest::new();
        assert!(manifest.record(ManifestEntry::new("k1", ArtifactKind::Image)));
        assert!(manifest.record(ManifestEntry::new("k1", ArtifactKind::Image)));
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains("k1"));
    }

    #[test]
    fn test_mark_submitted_clears_and_seals() {
        let manifest = CleanupManifest::new();
        manifest.record(ManifestEntry::new("k1", ArtifactKind::Image));
        manifest.record(ManifestEntry::new("k2", ArtifactKind::Video));

        let cleared = manifest.mark_submitted();
        assert_eq!(cleared.len(), 2);
        assert!(manifest.is_empty());
        assert!(manifest.is_submitted());

        assert!(!manifest.record(ManifestEntry::new("k3", ArtifactKind::Image)));
        assert!(manifest.is_empty());
        assert_eq!(manifest.drain_unless_submitted(), None);
    }

    #[test]
    fn test_drain_takes_everything_once() {
        let manifest = CleanupManifest::new();
        let shared = manifest.clone();
        shared.record(ManifestEntry::new("k1", ArtifactKind::VideoThumbnail));

        let drained = manifest.drain_unless_submitted().unwrap();
        assert_eq!(drained, vec![ManifestEntry::new("k1", ArtifactKind::VideoThumbnail)]);
        assert_eq!(drained[0].storage_type(), MediaKind::Image);
        assert_eq!(manifest.drain_unless_submitted(), Some(vec![]));
    }

    #[test]
    fn test_drain_abandons_but_still_records() {
        let manifest = CleanupManifest::new();
        assert!(!manifest.is_closed());

        manifest.drain_unless_submitted().unwrap();
        assert!(manifest.is_abandoned());
        assert!(manifest.is_closed());

        // A transfer that finishes late is picked up by the next cleanup
        assert!(manifest.record(ManifestEntry::new("late", ArtifactKind::Image)));
        assert_eq!(
            manifest.drain_unless_submitted(),
            Some(vec![ManifestEntry::new("late", ArtifactKind::Image)])
        );
    }
}
