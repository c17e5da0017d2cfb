#![allow(dead_code)]

//! Shared in-memory fakes for the sync engine's collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use draftloom_crypto::KdfParams;
use draftloom_sync::cloud::storage::project_file_properties;
use draftloom_sync::{
    project_file_name, CreateFile, MetaStore, ProjectSync, RemoteFileHandle, RemoteStore,
    SnapshotStore, SyncAccount, SyncError, SyncResult, UpdateFile,
};
use draftloom_types::{LocalProject, ProjectId, ProjectSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A file stored by [`MemoryRemoteStore`].
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub name: String,
    pub content: String,
    pub app_properties: HashMap<String, String>,
    pub modified_time: DateTime<Utc>,
}

/// In-memory remote store.
#[derive(Default)]
pub struct MemoryRemoteStore {
    files: Mutex<HashMap<String, StoredFile>>,
    next_id: AtomicUsize,
    pub fail_creates: AtomicBool,
    pub fail_downloads: AtomicBool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn get_file(&self, file_id: &str) -> Option<StoredFile> {
        self.files.lock().unwrap().get(file_id).cloned()
    }

    /// Inserts a file directly, returning its id.
    pub fn insert_file(
        &self,
        name: &str,
        content: &str,
        app_properties: HashMap<String, String>,
        modified_time: DateTime<Utc>,
    ) -> String {
        let id = format!("file-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.files.lock().unwrap().insert(
            id.clone(),
            StoredFile {
                name: name.to_string(),
                content: content.to_string(),
                app_properties,
                modified_time,
            },
        );
        id
    }

    fn handle(&self, id: &str, file: &StoredFile) -> RemoteFileHandle {
        RemoteFileHandle {
            id: id.to_string(),
            name: file.name.clone(),
            app_properties: file.app_properties.clone(),
            modified_time: Some(file.modified_time),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    async fn begin_auth(&self) -> SyncResult<String> {
        Ok("https://auth.example/consent".to_string())
    }

    async fn complete_auth(&self, auth_code: &str) -> SyncResult<SyncAccount> {
        if auth_code == "bad-code" {
            return Err(SyncError::InvalidGrant);
        }
        Ok(SyncAccount {
            account_id: "acct-1".to_string(),
            email: "user@example.com".to_string(),
            access_token: format!("token-for-{auth_code}"),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: None,
        })
    }

    async fn set_account(&self, _account: &SyncAccount) {}

    async fn clear_account(&self) {}

    async fn find_file(&self, name: &str) -> SyncResult<Option<RemoteFileHandle>> {
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, f)| self.handle(id, f)))
    }

    async fn list_files(&self, prefix: &str) -> SyncResult<Vec<RemoteFileHandle>> {
        let files = self.files.lock().unwrap();
        let mut handles: Vec<RemoteFileHandle> = files
            .iter()
            .filter(|(_, f)| f.name.starts_with(prefix))
            .map(|(id, f)| self.handle(id, f))
            .collect();
        handles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(handles)
    }

    async fn download(&self, file_id: &str) -> SyncResult<String> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(SyncError::Network("injected download failure".to_string()));
        }
        let files = self.files.lock().unwrap();
        files
            .get(file_id)
            .map(|f| f.content.clone())
            .ok_or_else(|| SyncError::RemoteFileMissing(file_id.to_string()))
    }

    async fn create_file(&self, req: CreateFile) -> SyncResult<RemoteFileHandle> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(SyncError::Network("injected upload failure".to_string()));
        }
        let id = self.insert_file(&req.name, &req.content, req.app_properties, Utc::now());
        let files = self.files.lock().unwrap();
        Ok(self.handle(&id, files.get(&id).unwrap()))
    }

    async fn update_file(&self, req: UpdateFile) -> SyncResult<RemoteFileHandle> {
        let mut files = self.files.lock().unwrap();
        let file = files
            .get_mut(&req.file_id)
            .ok_or_else(|| SyncError::RemoteFileMissing(req.file_id.clone()))?;
        file.content = req.content;
        file.app_properties = req.app_properties;
        file.modified_time = Utc::now();
        let file = file.clone();
        Ok(self.handle(&req.file_id, &file))
    }
}

/// In-memory local content store.
#[derive(Default)]
pub struct MemorySnapshotStore {
    projects: Mutex<HashMap<ProjectId, (LocalProject, serde_json::Value)>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(
        &self,
        id: ProjectId,
        name: &str,
        updated_at: DateTime<Utc>,
        data: serde_json::Value,
    ) {
        self.projects.lock().unwrap().insert(
            id,
            (
                LocalProject {
                    id,
                    name: name.to_string(),
                    updated_at,
                },
                data,
            ),
        );
    }

    pub fn project_count(&self) -> usize {
        self.projects.lock().unwrap().len()
    }

    pub fn get_data(&self, id: ProjectId) -> Option<serde_json::Value> {
        self.projects
            .lock()
            .unwrap()
            .get(&id)
            .map(|(_, data)| data.clone())
    }

    pub fn contains(&self, id: ProjectId) -> bool {
        self.projects.lock().unwrap().contains_key(&id)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn list_projects(&self) -> SyncResult<Vec<LocalProject>> {
        let projects = self.projects.lock().unwrap();
        let mut list: Vec<LocalProject> = projects.values().map(|(p, _)| p.clone()).collect();
        list.sort_by_key(|p| p.id);
        Ok(list)
    }

    async fn build_snapshot(&self, project_id: ProjectId) -> SyncResult<ProjectSnapshot> {
        let projects = self.projects.lock().unwrap();
        let (project, data) = projects
            .get(&project_id)
            .ok_or_else(|| SyncError::Storage(format!("no such project: {project_id}")))?;
        Ok(ProjectSnapshot::new(
            project_id,
            project.name.clone(),
            data.clone(),
        ))
    }

    async fn apply_snapshot(&self, snapshot: &ProjectSnapshot) -> SyncResult<()> {
        self.insert_project(
            snapshot.project_id,
            &snapshot.name,
            Utc::now(),
            snapshot.data.clone(),
        );
        Ok(())
    }

    async fn apply_snapshot_as_new(&self, snapshot: &ProjectSnapshot) -> SyncResult<ProjectId> {
        let new_id = ProjectId::new();
        self.insert_project(new_id, &snapshot.name, Utc::now(), snapshot.data.clone());
        Ok(new_id)
    }
}

/// Bundles the engine over fresh in-memory collaborators.
pub struct TestHarness {
    pub remote: Arc<MemoryRemoteStore>,
    pub snapshots: Arc<MemorySnapshotStore>,
    pub meta: Arc<MetaStore>,
    pub sync: Arc<ProjectSync>,
}

impl TestHarness {
    pub fn new() -> Self {
        let remote = Arc::new(MemoryRemoteStore::new());
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let meta = Arc::new(MetaStore::open_in_memory().unwrap());
        let sync = Arc::new(ProjectSync::with_kdf_params(
            remote.clone() as Arc<dyn RemoteStore>,
            snapshots.clone() as Arc<dyn SnapshotStore>,
            meta.clone(),
            KdfParams::fast_insecure(),
        ));
        Self {
            remote,
            snapshots,
            meta,
            sync,
        }
    }
}

/// Seals a snapshot the way a push would and seeds it into the remote
/// store under the canonical name and metadata. Returns the file id.
pub fn seed_remote_project(
    remote: &MemoryRemoteStore,
    project_id: ProjectId,
    name: &str,
    revision: i64,
    updated_at: DateTime<Utc>,
    passphrase: &str,
    data: serde_json::Value,
) -> String {
    let snapshot = ProjectSnapshot::new(project_id, name, data);
    let plaintext = serde_json::to_vec(&snapshot).unwrap();
    let envelope =
        draftloom_crypto::seal_with_params(passphrase, &plaintext, &KdfParams::fast_insecure())
            .unwrap();
    let body = serde_json::to_string(&envelope).unwrap();

    let props = project_file_properties(project_id, revision, updated_at);
    remote.insert_file(&project_file_name(project_id), &body, props, updated_at)
}
