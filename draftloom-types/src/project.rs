//! Project model types shared between the local store and the sync engine.

use crate::ids::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version stamped into every snapshot (and onto remote file
/// metadata). Bumped when the snapshot layout changes incompatibly.
pub const SNAPSHOT_SCHEMA_VERSION: &str = "1";

/// The local store's view of a project: just enough for the sync engine
/// to enumerate projects and run its timestamp fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalProject {
    /// The project's ID.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// When the project was last modified locally.
    pub updated_at: DateTime<Utc>,
}

/// Self-contained serialized representation of one project's full state.
///
/// Built by the snapshot builder from local storage and applied back as a
/// whole-table replace. The sync engine never looks inside `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    /// The project this snapshot captures.
    pub project_id: ProjectId,
    /// Display name at snapshot time.
    pub name: String,
    /// Snapshot layout version, currently [`SNAPSHOT_SCHEMA_VERSION`].
    pub schema_version: String,
    /// Opaque serialized project state, one entry per entity table.
    pub data: serde_json::Value,
}

impl ProjectSnapshot {
    /// Creates a snapshot with the current schema version.
    pub fn new(project_id: ProjectId, name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            project_id,
            name: name.into(),
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            data,
        }
    }
}
