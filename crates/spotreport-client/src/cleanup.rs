//! Deletion of orphaned uploads when a report is abandoned

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use crate::manifest::{CleanupManifest, ManifestEntry};
use crate::transport::DeletionTransport;

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub attempted: usize,
    pub deleted: usize,
    pub failed: usize,
    /// The report was submitted, so nothing was touched
    pub skipped: bool,
}

pub struct CleanupCoordinator {
    deletions: Arc<dyn DeletionTransport>,
    manifest: CleanupManifest,
}

impl CleanupCoordinator {
    pub fn new(deletions: Arc<dyn DeletionTransport>, manifest: CleanupManifest) -> Self {
        Self {
            deletions,
            manifest,
        }
    }

    /// Delete every uploaded key unless the report was submitted.
    ///
    /// Deletions run concurrently and are best-effort: failures are logged
    /// and never retried. Safe to call repeatedly.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "abandoned_report"))]
    pub async fn cleanup_if_abandoned(&self) -> CleanupSummary {
        let _gate = self.manifest.exclusive().await;

        let Some(entries) = self.manifest.drain_unless_submitted() else {
            tracing::debug!("Report was submitted, skipping cleanup");
            return CleanupSummary {
                skipped: true,
                ..Default::default()
            };
        };

        if entries.is_empty() {
            return CleanupSummary::default();
        }

        tracing::info!(count = entries.len(), "Deleting orphaned uploads");

        let results = join_all(entries.iter().map(|entry| self.delete(entry))).await;
        let deleted = results.iter().filter(|ok| **ok).count();

        let summary = CleanupSummary {
            attempted: entries.len(),
            deleted,
            failed: entries.len() - deleted,
            skipped: false,
        };
        tracing::info!(
            deleted = summary.deleted,
            failed = summary.failed,
            "Cleanup finished"
        );
        summary
    }

    async fn delete(&self, entry: &ManifestEntry) -> bool {
        match self
            .deletions
            .delete_media(&entry.remote_key, entry.storage_type())
            .await
        {
            Ok(()) => {
                tracing::debug!(remote_key = %entry.remote_key, "Deleted orphaned upload");
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    remote_key = %entry.remote_key,
                    artifact = %entry.artifact_kind,
                    "Failed to delete orphaned upload"
                );
                false
            }
        }
    }
}
