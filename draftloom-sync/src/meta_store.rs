//! Durable sync metadata, backed by SQLite.
//!
//! One row per (project, provider): the revision counter, the remote file
//! id, and the last successful sync time. This is the engine's only
//! conflict-resolution state. A missing row means "this device has never
//! completed a sync of this project". Rows are never deleted; orphans left
//! behind by local project deletion are harmless.
//!
//! The store also persists the serialized session snapshot (account and,
//! when the user opted in, the passphrase), keeping all sync-owned state
//! in one file separate from the content database.

use crate::error::{SyncError, SyncResult};
use crate::session::{SessionRepository, SessionSnapshot};
use chrono::{DateTime, Utc};
use draftloom_types::ProjectId;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-(project, provider) sync metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSyncMeta {
    /// Monotonic revision counter, ≥ 0.
    pub revision: i64,
    /// Id of the winning remote file for this project.
    pub remote_file_id: String,
    /// When this device last completed a push or pull of the project.
    pub last_synced_at: DateTime<Utc>,
}

/// Persistent store for sync metadata and session state.
pub struct MetaStore {
    conn: Arc<Mutex<Connection>>,
}

impl MetaStore {
    /// Opens (or creates) a metadata store at the given path.
    pub fn new(path: &str) -> SyncResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SyncError::Storage(format!("failed to open meta store: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory metadata store (for testing).
    pub fn open_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::Storage(format!("failed to open in-memory meta store: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> SyncResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sync_project_meta (
                project_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                revision INTEGER NOT NULL,
                remote_file_id TEXT NOT NULL,
                last_synced_at TEXT NOT NULL,
                UNIQUE(project_id, provider)
            );

            CREATE TABLE IF NOT EXISTS session_state (
                provider TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| SyncError::Storage(format!("failed to init meta schema: {e}")))?;
        Ok(())
    }

    /// Loads the metadata row for a project, if one exists.
    pub fn get_meta(
        &self,
        project_id: ProjectId,
        provider: &str,
    ) -> SyncResult<Option<ProjectSyncMeta>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT revision, remote_file_id, last_synced_at FROM sync_project_meta
                 WHERE project_id = ?1 AND provider = ?2",
                params![project_id.to_string(), provider],
                |row| {
                    let revision: i64 = row.get(0)?;
                    let remote_file_id: String = row.get(1)?;
                    let last_synced_at: String = row.get(2)?;
                    Ok((revision, remote_file_id, last_synced_at))
                },
            )
            .optional()
            .map_err(|e| SyncError::Storage(format!("failed to read meta: {e}")))?;

        match row {
            None => Ok(None),
            Some((revision, remote_file_id, ts)) => {
                let last_synced_at = DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| SyncError::Storage(format!("invalid timestamp in meta: {e}")))?
                    .with_timezone(&Utc);
                Ok(Some(ProjectSyncMeta {
                    revision,
                    remote_file_id,
                    last_synced_at,
                }))
            }
        }
    }

    /// Writes (or replaces) the metadata row for a project in one statement.
    pub fn upsert_meta(
        &self,
        project_id: ProjectId,
        provider: &str,
        meta: &ProjectSyncMeta,
    ) -> SyncResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO sync_project_meta
             (project_id, provider, revision, remote_file_id, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project_id.to_string(),
                provider,
                meta.revision,
                meta.remote_file_id,
                meta.last_synced_at.to_rfc3339(),
            ],
        )
        .map_err(|e| SyncError::Storage(format!("failed to upsert meta: {e}")))?;
        Ok(())
    }

    /// Loads all metadata rows for a provider, keyed by project id.
    pub fn all_meta(&self, provider: &str) -> SyncResult<HashMap<ProjectId, ProjectSyncMeta>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT project_id, revision, remote_file_id, last_synced_at
                 FROM sync_project_meta WHERE provider = ?1",
            )
            .map_err(|e| SyncError::Storage(format!("failed to prepare meta query: {e}")))?;

        let rows = stmt
            .query_map(params![provider], |row| {
                let pid: String = row.get(0)?;
                let revision: i64 = row.get(1)?;
                let remote_file_id: String = row.get(2)?;
                let ts: String = row.get(3)?;
                Ok((pid, revision, remote_file_id, ts))
            })
            .map_err(|e| SyncError::Storage(format!("failed to query meta: {e}")))?;

        let mut result = HashMap::new();
        for row in rows {
            let (pid, revision, remote_file_id, ts) =
                row.map_err(|e| SyncError::Storage(format!("failed to read meta row: {e}")))?;
            let project_id = ProjectId::parse(&pid)
                .map_err(|e| SyncError::Storage(format!("invalid project_id in meta: {e}")))?;
            let last_synced_at = DateTime::parse_from_rfc3339(&ts)
                .map_err(|e| SyncError::Storage(format!("invalid timestamp in meta: {e}")))?
                .with_timezone(&Utc);
            result.insert(
                project_id,
                ProjectSyncMeta {
                    revision,
                    remote_file_id,
                    last_synced_at,
                },
            );
        }
        Ok(result)
    }
}

impl SessionRepository for MetaStore {
    fn load_session(&self, provider: &str) -> SyncResult<Option<SessionSnapshot>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM session_state WHERE provider = ?1",
                params![provider],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SyncError::Storage(format!("failed to read session: {e}")))?;

        match json {
            None => Ok(None),
            Some(json) => {
                let snapshot: SessionSnapshot = serde_json::from_str(&json)?;
                Ok(Some(snapshot))
            }
        }
    }

    fn save_session(&self, provider: &str, snapshot: &SessionSnapshot) -> SyncResult<()> {
        let json = serde_json::to_string(snapshot)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO session_state (provider, snapshot) VALUES (?1, ?2)",
            params![provider, json],
        )
        .map_err(|e| SyncError::Storage(format!("failed to save session: {e}")))?;
        Ok(())
    }

    fn clear_session(&self, provider: &str) -> SyncResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM session_state WHERE provider = ?1",
            params![provider],
        )
        .map_err(|e| SyncError::Storage(format!("failed to clear session: {e}")))?;
        Ok(())
    }
}
