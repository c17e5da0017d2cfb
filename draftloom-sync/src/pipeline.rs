//! Push and pull pipelines.
//!
//! The push pipeline turns a project into an encrypted remote file and
//! bumps the revision counter; the pull pipeline does the reverse. Both
//! update the metadata store only after every remote and local step has
//! succeeded, so a failed operation leaves this device's state untouched
//! and safe to retry as-is.

use crate::cloud::storage::{
    project_file_name, project_file_properties, CreateFile, RemoteStore, UpdateFile,
    PROJECT_FILE_MIME,
};
use crate::diff::RemoteProjectEntry;
use crate::error::{SyncError, SyncResult};
use crate::meta_store::{MetaStore, ProjectSyncMeta};
use crate::snapshot::SnapshotStore;
use chrono::Utc;
use draftloom_crypto::{self as crypto, KdfParams, SnapshotEnvelope};
use draftloom_types::{ProjectId, ProjectSnapshot};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a successful push.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    /// The revision that was written.
    pub revision: i64,
    /// The remote file the snapshot landed in.
    pub file_id: String,
}

/// Per-project push/pull operations.
pub struct ProjectSync {
    remote: Arc<dyn RemoteStore>,
    snapshots: Arc<dyn SnapshotStore>,
    meta: Arc<MetaStore>,
    kdf: KdfParams,
}

impl ProjectSync {
    /// Creates the pipelines over the given collaborators.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        snapshots: Arc<dyn SnapshotStore>,
        meta: Arc<MetaStore>,
    ) -> Self {
        Self::with_kdf_params(remote, snapshots, meta, KdfParams::default())
    }

    /// Creates the pipelines with explicit KDF parameters (tests use the
    /// fast preset).
    pub fn with_kdf_params(
        remote: Arc<dyn RemoteStore>,
        snapshots: Arc<dyn SnapshotStore>,
        meta: Arc<MetaStore>,
        kdf: KdfParams,
    ) -> Self {
        Self {
            remote,
            snapshots,
            meta,
            kdf,
        }
    }

    fn provider(&self) -> &'static str {
        self.remote.provider_name()
    }

    /// Builds, encrypts, and uploads a full snapshot of the project.
    ///
    /// The uploaded revision is always the locally recorded revision plus
    /// one (starting from 0 when the project has never been synced); an
    /// unseen remote revision is never silently adopted. Two clients
    /// pushing the same project race on this read-modify-write of the
    /// metadata row; there is no lock or lease around it, and the later
    /// upload wins.
    pub async fn push(&self, project_id: ProjectId, passphrase: &str) -> SyncResult<PushOutcome> {
        let snapshot = self.snapshots.build_snapshot(project_id).await?;
        let revision = self.local_revision(project_id)? + 1;

        let plaintext = serde_json::to_vec(&snapshot)?;
        let envelope = crypto::seal_with_params(passphrase, &plaintext, &self.kdf)?;
        let body = serde_json::to_string(&envelope)?;

        let name = project_file_name(project_id);
        let now = Utc::now();
        let app_properties = project_file_properties(project_id, revision, now);

        debug!("Pushing project {} at revision {}", project_id, revision);

        let handle = match self.remote.find_file(&name).await? {
            Some(existing) => {
                self.remote
                    .update_file(UpdateFile {
                        file_id: existing.id,
                        content: body,
                        mime_type: PROJECT_FILE_MIME.to_string(),
                        app_properties,
                    })
                    .await?
            }
            None => {
                self.remote
                    .create_file(CreateFile {
                        name,
                        content: body,
                        mime_type: PROJECT_FILE_MIME.to_string(),
                        app_properties,
                    })
                    .await?
            }
        };

        self.meta.upsert_meta(
            project_id,
            self.provider(),
            &ProjectSyncMeta {
                revision,
                remote_file_id: handle.id.clone(),
                last_synced_at: now,
            },
        )?;

        info!("Pushed project {} at revision {}", project_id, revision);
        Ok(PushOutcome {
            revision,
            file_id: handle.id,
        })
    }

    /// Downloads, decrypts, and applies the given remote file, then
    /// records its revision and file id in the metadata store.
    ///
    /// Decryption happens entirely in memory before any local table is
    /// touched; a wrong passphrase cannot corrupt local state.
    pub async fn pull_from_file(
        &self,
        entry: &RemoteProjectEntry,
        passphrase: &str,
    ) -> SyncResult<()> {
        let snapshot = self.download_and_open(entry, passphrase).await?;

        self.snapshots.apply_snapshot(&snapshot).await?;

        self.meta.upsert_meta(
            entry.project_id,
            self.provider(),
            &ProjectSyncMeta {
                revision: entry.revision,
                remote_file_id: entry.file_id.clone(),
                last_synced_at: Utc::now(),
            },
        )?;

        info!(
            "Pulled project {} at revision {}",
            entry.project_id, entry.revision
        );
        Ok(())
    }

    /// Downloads and decrypts the given remote file, applying it under a
    /// freshly minted project id. The source project's metadata row is
    /// never created or updated.
    pub async fn pull_as_new(
        &self,
        entry: &RemoteProjectEntry,
        passphrase: &str,
    ) -> SyncResult<ProjectId> {
        let snapshot = self.download_and_open(entry, passphrase).await?;
        let new_id = self.snapshots.apply_snapshot_as_new(&snapshot).await?;

        info!(
            "Imported a copy of project {} as {}",
            entry.project_id, new_id
        );
        Ok(new_id)
    }

    /// Returns whether the remote revision strictly exceeds the locally
    /// recorded one. A single lightweight lookup, used to decide whether
    /// a full pull is worth it before opening a project.
    pub async fn check_remote_diff(&self, project_id: ProjectId) -> SyncResult<bool> {
        let name = project_file_name(project_id);
        let Some(handle) = self.remote.find_file(&name).await? else {
            return Ok(false);
        };
        let Some(entry) = RemoteProjectEntry::from_handle(&handle) else {
            return Ok(false);
        };

        let local_revision = self
            .meta
            .get_meta(project_id, self.provider())?
            .map(|m| m.revision)
            .unwrap_or(0);

        Ok(entry.revision > local_revision)
    }

    /// The locally recorded revision for a project (0 when the project
    /// has never been synced from this device).
    pub fn local_revision(&self, project_id: ProjectId) -> SyncResult<i64> {
        Ok(self
            .meta
            .get_meta(project_id, self.provider())?
            .map(|m| m.revision)
            .unwrap_or(0))
    }

    async fn download_and_open(
        &self,
        entry: &RemoteProjectEntry,
        passphrase: &str,
    ) -> SyncResult<ProjectSnapshot> {
        debug!(
            "Downloading project {} (file {})",
            entry.project_id, entry.file_id
        );

        let body = self.remote.download(&entry.file_id).await?;
        let envelope: SnapshotEnvelope = serde_json::from_str(&body)?;
        let plaintext = crypto::open_with_params(passphrase, &envelope, &self.kdf)?;
        let snapshot: ProjectSnapshot = serde_json::from_slice(&plaintext)?;

        if snapshot.project_id != entry.project_id {
            return Err(SyncError::SyncFailed(format!(
                "remote file {} holds project {}, expected {}",
                entry.file_id, snapshot.project_id, entry.project_id
            )));
        }

        Ok(snapshot)
    }
}
