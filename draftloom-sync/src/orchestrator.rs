//! Full-fleet reconciliation.
//!
//! `sync_all` brings every visible project in line with the remote store
//! in one pass: first pulling projects that exist only remotely, then
//! walking local projects and pushing or pulling per the diff report.
//! Used on connect and on demand.

use crate::cloud::storage::{RemoteStore, FILE_PREFIX};
use crate::diff::{classify_projects, dedup_remote_entries, CompareBasis, RemoteProjectEntry, SyncDecision};
use crate::error::{SyncError, SyncResult};
use crate::meta_store::MetaStore;
use crate::pipeline::ProjectSync;
use crate::snapshot::SnapshotStore;
use draftloom_types::ProjectId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Which half of the pass a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Pulling projects that exist only remotely.
    Pull,
    /// Walking local projects (push, pull, or skip).
    Push,
}

/// Progress event, emitted once per processed project.
#[derive(Debug, Clone)]
pub struct SyncProgress {
    /// Current phase.
    pub phase: SyncPhase,
    /// The project just processed.
    pub project_id: ProjectId,
    /// Zero-based index within the phase.
    pub index: usize,
    /// Total number of projects in the phase.
    pub total: usize,
}

/// Counts from a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Projects downloaded and applied.
    pub pulled: usize,
    /// Projects encrypted and uploaded.
    pub pushed: usize,
    /// Projects already at the same revision on both sides.
    pub unchanged: usize,
    /// Losing remote duplicates observed (left in place).
    pub duplicates: usize,
}

/// Runs the diff engine and the pipelines over the whole project fleet.
pub struct SyncOrchestrator {
    remote: Arc<dyn RemoteStore>,
    snapshots: Arc<dyn SnapshotStore>,
    meta: Arc<MetaStore>,
    sync: Arc<ProjectSync>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator over the shared collaborators.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        snapshots: Arc<dyn SnapshotStore>,
        meta: Arc<MetaStore>,
        sync: Arc<ProjectSync>,
    ) -> Self {
        Self {
            remote,
            snapshots,
            meta,
            sync,
        }
    }

    /// Reconciles every project in one pass.
    ///
    /// Progress events go to `progress` (when given) after each project;
    /// the channel closing on the receiver side only stops the events,
    /// not the pass. An error while syncing one project propagates and
    /// aborts the remaining loop; writes already applied to earlier
    /// projects in the pass stay in place.
    pub async fn sync_all(
        &self,
        passphrase: &str,
        progress: Option<mpsc::Sender<SyncProgress>>,
    ) -> SyncResult<SyncSummary> {
        let handles = self.remote.list_files(FILE_PREFIX).await?;
        let entries: Vec<RemoteProjectEntry> = handles
            .iter()
            .filter_map(RemoteProjectEntry::from_handle)
            .collect();
        let index = dedup_remote_entries(entries);

        let local = self.snapshots.list_projects().await?;
        let meta = self.meta.all_meta(self.remote.provider_name())?;
        let report = classify_projects(&index, &local, &meta);

        info!(
            "Fleet sync: {} remote-only, {} local-only, {} to pull, {} to push, {} unchanged",
            report.remote_only.len(),
            report.local_only.len(),
            report.to_pull.len(),
            report.to_push.len(),
            report.unchanged.len()
        );

        let mut summary = SyncSummary {
            duplicates: report.duplicates.values().map(Vec::len).sum(),
            ..Default::default()
        };

        // Phase 1: projects that exist only remotely.
        let total = report.remote_only.len();
        for (i, project_id) in report.remote_only.iter().copied().enumerate() {
            let entry = index
                .winners
                .get(&project_id)
                .ok_or_else(|| SyncError::RemoteFileMissing(project_id.to_string()))?;
            self.sync.pull_from_file(entry, passphrase).await?;
            summary.pulled += 1;

            if let Some(tx) = &progress {
                let _ = tx
                    .send(SyncProgress {
                        phase: SyncPhase::Pull,
                        project_id,
                        index: i,
                        total,
                    })
                    .await;
            }
        }

        // Phase 2: every local project, in id order.
        let local_comparisons: Vec<_> = report
            .comparisons
            .iter()
            .filter(|c| c.basis != CompareBasis::RemoteOnly)
            .collect();
        let total = local_comparisons.len();

        for (i, comparison) in local_comparisons.into_iter().enumerate() {
            let project_id = comparison.project_id;
            match comparison.decision {
                SyncDecision::Push => {
                    self.sync.push(project_id, passphrase).await?;
                    summary.pushed += 1;
                }
                SyncDecision::Pull => {
                    let entry = index
                        .winners
                        .get(&project_id)
                        .ok_or_else(|| SyncError::RemoteFileMissing(project_id.to_string()))?;
                    self.sync.pull_from_file(entry, passphrase).await?;
                    summary.pulled += 1;
                }
                SyncDecision::Unchanged => {
                    debug!("Project {} unchanged", project_id);
                    summary.unchanged += 1;
                }
            }

            if let Some(tx) = &progress {
                let _ = tx
                    .send(SyncProgress {
                        phase: SyncPhase::Push,
                        project_id,
                        index: i,
                        total,
                    })
                    .await;
            }
        }

        info!(
            "Fleet sync done: {} pulled, {} pushed, {} unchanged",
            summary.pulled, summary.pushed, summary.unchanged
        );
        Ok(summary)
    }
}
