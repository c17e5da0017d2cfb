//! Remote object store abstraction.
//!
//! Defines the interface the sync engine needs from a cloud provider:
//! named files in an account-scoped folder, each carrying a small
//! key-value metadata map. Also fixes the wire conventions (file naming
//! and metadata keys) that every provider implementation must follow.

use crate::error::SyncResult;
use crate::session::SyncAccount;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use draftloom_types::{ProjectId, SNAPSHOT_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix of every project file name.
pub const FILE_PREFIX: &str = "draftloom-project-";

/// Suffix of every project file name.
pub const FILE_SUFFIX: &str = ".json";

/// MIME type of project files (the body is a JSON ciphertext envelope).
pub const PROJECT_FILE_MIME: &str = "application/json";

/// Metadata key: stringified revision counter.
pub const PROP_REVISION: &str = "revision";

/// Metadata key: project UUID.
pub const PROP_PROJECT_ID: &str = "projectId";

/// Metadata key: snapshot schema version.
pub const PROP_SCHEMA_VERSION: &str = "schemaVersion";

/// Metadata key: RFC 3339 timestamp of the upload.
pub const PROP_UPDATED_AT: &str = "updatedAt";

/// Canonical remote file name for a project.
pub fn project_file_name(project_id: ProjectId) -> String {
    format!("{FILE_PREFIX}{project_id}{FILE_SUFFIX}")
}

/// Recovers a project id from a file name, if it follows the convention.
pub fn parse_project_file_name(name: &str) -> Option<ProjectId> {
    let inner = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    ProjectId::parse(inner).ok()
}

/// Builds the metadata map attached to a project file on upload.
pub fn project_file_properties(
    project_id: ProjectId,
    revision: i64,
    updated_at: DateTime<Utc>,
) -> HashMap<String, String> {
    HashMap::from([
        (PROP_REVISION.to_string(), revision.to_string()),
        (PROP_PROJECT_ID.to_string(), project_id.to_string()),
        (
            PROP_SCHEMA_VERSION.to_string(),
            SNAPSHOT_SCHEMA_VERSION.to_string(),
        ),
        (
            PROP_UPDATED_AT.to_string(),
            updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
    ])
}

/// A file in the remote store, as seen by the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFileHandle {
    /// The file's unique identifier in the remote store.
    pub id: String,
    /// The file name.
    pub name: String,
    /// Application metadata attached to the file.
    pub app_properties: HashMap<String, String>,
    /// Last modified time reported by the provider.
    pub modified_time: Option<DateTime<Utc>>,
}

/// Request to create a new remote file.
#[derive(Debug, Clone)]
pub struct CreateFile {
    /// File name.
    pub name: String,
    /// File body.
    pub content: String,
    /// MIME type.
    pub mime_type: String,
    /// Application metadata.
    pub app_properties: HashMap<String, String>,
}

/// Request to overwrite an existing remote file.
#[derive(Debug, Clone)]
pub struct UpdateFile {
    /// Id of the file to overwrite.
    pub file_id: String,
    /// New file body.
    pub content: String,
    /// MIME type.
    pub mime_type: String,
    /// Replacement application metadata.
    pub app_properties: HashMap<String, String>,
}

/// Abstract remote store interface.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the name of the provider.
    fn provider_name(&self) -> &'static str;

    /// Returns whether the store holds credentials and is ready.
    fn is_authenticated(&self) -> bool;

    /// Starts interactive authentication; returns the URL the user must
    /// visit to grant access.
    async fn begin_auth(&self) -> SyncResult<String>;

    /// Completes authentication with the authorization code, returning the
    /// connected account's identity and tokens.
    async fn complete_auth(&self, auth_code: &str) -> SyncResult<SyncAccount>;

    /// Restores credentials from a previously persisted account.
    async fn set_account(&self, account: &SyncAccount);

    /// Drops any held credentials.
    async fn clear_account(&self);

    /// Finds a file by exact name in the sync folder.
    async fn find_file(&self, name: &str) -> SyncResult<Option<RemoteFileHandle>>;

    /// Lists all files in the sync folder whose name starts with `prefix`.
    async fn list_files(&self, prefix: &str) -> SyncResult<Vec<RemoteFileHandle>>;

    /// Downloads a file's body.
    async fn download(&self, file_id: &str) -> SyncResult<String>;

    /// Creates a new file in the sync folder.
    async fn create_file(&self, req: CreateFile) -> SyncResult<RemoteFileHandle>;

    /// Overwrites an existing file's body and metadata.
    async fn update_file(&self, req: UpdateFile) -> SyncResult<RemoteFileHandle>;
}
