//! Seam to the local content store.
//!
//! The sync engine never touches project tables directly; it asks the
//! application's store to build a full snapshot of a project or to apply
//! one back. Applying is an atomic whole-table replace per entity type;
//! there is no field-level merging anywhere in this engine.

use crate::error::SyncResult;
use async_trait::async_trait;
use draftloom_types::{LocalProject, ProjectId, ProjectSnapshot};

/// Local store operations the sync engine depends on.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Lists every project visible to sync.
    async fn list_projects(&self) -> SyncResult<Vec<LocalProject>>;

    /// Serializes one project's full state.
    async fn build_snapshot(&self, project_id: ProjectId) -> SyncResult<ProjectSnapshot>;

    /// Applies a snapshot, replacing the project's local state wholesale.
    /// Creates the project locally if it does not exist yet.
    async fn apply_snapshot(&self, snapshot: &ProjectSnapshot) -> SyncResult<()>;

    /// Applies a snapshot under a freshly minted project id (manual
    /// "import a copy"). Returns the new id.
    async fn apply_snapshot_as_new(&self, snapshot: &ProjectSnapshot) -> SyncResult<ProjectId>;
}
