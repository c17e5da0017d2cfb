use chrono::{Duration, Utc};
use draftloom_sync::cloud::storage::{PROP_PROJECT_ID, PROP_REVISION};
use draftloom_sync::{
    project_file_name, project_file_properties, CreateFile, DriveConfig, DriveStore, RemoteStore,
    SyncAccount, SyncError, UpdateFile, PROJECT_FILE_MIME,
};
use draftloom_types::ProjectId;
use wiremock::matchers::{body_string_contains, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Config defaults ─────────────────────────────────────────────

#[test]
fn drive_config_default() {
    let cfg = DriveConfig::default();
    assert_eq!(cfg.sync_folder, "Draftloom");
    assert_eq!(cfg.redirect_uri, "urn:ietf:wg:oauth:2.0:oob");
    assert!(cfg.client_id.is_empty());
    assert!(cfg.client_secret.is_empty());
    assert_eq!(cfg.api_base_url, "https://www.googleapis.com");
    assert_eq!(cfg.oauth_base_url, "https://oauth2.googleapis.com");
    assert_eq!(cfg.auth_base_url, "https://accounts.google.com");
}

#[test]
fn drive_config_serde_roundtrip() {
    let cfg = DriveConfig {
        client_id: "my_id".to_string(),
        client_secret: "my_secret".to_string(),
        redirect_uri: "http://localhost".to_string(),
        ..Default::default()
    };
    let json = serde_json::to_string(&cfg).unwrap();
    let deserialized: DriveConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.client_id, "my_id");
    assert_eq!(deserialized.redirect_uri, "http://localhost");
    assert_eq!(deserialized.sync_folder, "Draftloom");
}

// ── Store construction & auth URL ───────────────────────────────

#[test]
fn provider_name_and_initial_auth_state() {
    let store = DriveStore::new(DriveConfig::default());
    assert_eq!(store.provider_name(), "google-drive");
    assert!(!store.is_authenticated());
}

#[tokio::test]
async fn begin_auth_without_client_id_fails() {
    let store = DriveStore::new(DriveConfig::default());
    let err = store.begin_auth().await.unwrap_err();
    assert!(matches!(err, SyncError::MissingClientId));
}

#[tokio::test]
async fn begin_auth_url_contains_encoded_params() {
    let config = DriveConfig {
        client_id: "my+special&id".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "http://localhost:8080/callback".to_string(),
        ..Default::default()
    };
    let store = DriveStore::new(config);
    let url = store.begin_auth().await.unwrap();
    assert!(url.contains("my%2Bspecial%26id"));
    assert!(url.contains("drive.file"));
    assert!(url.contains("access_type=offline"));
    assert!(url.contains("prompt=consent"));
    assert!(url.contains("response_type=code"));
}

// ── Wiremock helpers ────────────────────────────────────────────

fn mock_config(server: &MockServer) -> DriveConfig {
    DriveConfig {
        client_id: "test_client".to_string(),
        client_secret: "test_secret".to_string(),
        api_base_url: server.uri(),
        oauth_base_url: server.uri(),
        auth_base_url: server.uri(),
        ..Default::default()
    }
}

fn account_with(access_token: &str, refresh_token: Option<&str>) -> SyncAccount {
    SyncAccount {
        account_id: "perm-1".to_string(),
        email: "user@example.com".to_string(),
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at: None,
    }
}

async fn mock_folder_lookup(server: &MockServer, folder_id: &str) {
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("fields", "files(id,name)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [{"id": folder_id, "name": "Draftloom"}]
        })))
        .expect(1..)
        .mount(server)
        .await;
}

// ── complete_auth ───────────────────────────────────────────────

#[tokio::test]
async fn complete_auth_exchanges_code_and_fetches_identity() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new_access_token",
            "refresh_token": "new_refresh_token",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/about"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user": {
                "permissionId": "perm-42",
                "emailAddress": "writer@example.com"
            }
        })))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    let account = store.complete_auth("auth_code_123").await.unwrap();

    assert!(store.is_authenticated());
    assert_eq!(account.account_id, "perm-42");
    assert_eq!(account.email, "writer@example.com");
    assert_eq!(account.access_token, "new_access_token");
    assert_eq!(account.refresh_token.as_deref(), Some("new_refresh_token"));
    assert!(account.expires_at.is_some());
}

#[tokio::test]
async fn complete_auth_invalid_grant_is_specific() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    let err = store.complete_auth("bad_code").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidGrant));
    assert!(!store.is_authenticated());
}

#[tokio::test]
async fn complete_auth_redirect_mismatch_is_specific() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "redirect_uri_mismatch"
        })))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    let err = store.complete_auth("code").await.unwrap_err();
    assert!(matches!(err, SyncError::RedirectUriMismatch));
}

// ── set_account / clear_account ─────────────────────────────────

#[tokio::test]
async fn set_account_restores_credentials() {
    let store = DriveStore::new(DriveConfig::default());
    store.set_account(&account_with("at", Some("rt"))).await;
    assert!(store.is_authenticated());

    store.clear_account().await;
    assert!(!store.is_authenticated());
}

// ── Token refresh ───────────────────────────────────────────────

#[tokio::test]
async fn expired_token_is_refreshed_before_use() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh_token"
            // no refresh_token, no expires_in
        })))
        .expect(1)
        .mount(&server)
        .await;

    mock_folder_lookup(&server, "folder-1").await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageSize", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": []
        })))
        .expect(1..)
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    let mut account = account_with("stale_token", Some("my_refresh"));
    account.expires_at = Some(Utc::now() - Duration::minutes(5));
    store.set_account(&account).await;

    let files = store.list_files("draftloom-project-").await.unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn expired_token_without_refresh_token_fails() {
    let store = DriveStore::new(DriveConfig::default());
    let mut account = account_with("stale", None);
    account.expires_at = Some(Utc::now() - Duration::minutes(5));
    store.set_account(&account).await;

    let err = store.download("some-file").await.unwrap_err();
    assert!(matches!(err, SyncError::TokenExpired));
}

#[tokio::test]
async fn refresh_rejection_maps_to_invalid_grant() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    let mut account = account_with("stale", Some("revoked_refresh"));
    account.expires_at = Some(Utc::now() - Duration::minutes(5));
    store.set_account(&account).await;

    let err = store.download("some-file").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidGrant));
}

// ── find_file / list_files ──────────────────────────────────────

#[tokio::test]
async fn find_file_returns_handle_with_app_properties() {
    let server = MockServer::start().await;
    mock_folder_lookup(&server, "folder-1").await;

    let id = ProjectId::new();
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageSize", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [{
                "id": "f1",
                "name": project_file_name(id),
                "appProperties": {
                    "revision": "4",
                    "projectId": id.to_string(),
                    "schemaVersion": "1",
                    "updatedAt": "2025-03-01T12:00:00.000Z"
                },
                "modifiedTime": "2025-03-01T12:00:01Z"
            }]
        })))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    store.set_account(&account_with("token", None)).await;

    let handle = store
        .find_file(&project_file_name(id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handle.id, "f1");
    assert_eq!(handle.app_properties[PROP_REVISION], "4");
    assert_eq!(handle.app_properties[PROP_PROJECT_ID], id.to_string());
    assert!(handle.modified_time.is_some());
}

#[tokio::test]
async fn find_file_missing_returns_none() {
    let server = MockServer::start().await;
    mock_folder_lookup(&server, "folder-1").await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageSize", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": []
        })))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    store.set_account(&account_with("token", None)).await;

    let found = store.find_file("draftloom-project-nope.json").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn list_files_follows_pagination() {
    let server = MockServer::start().await;
    mock_folder_lookup(&server, "folder-1").await;

    let page_counter = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
    let counter_clone = page_counter.clone();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageSize", "100"))
        .respond_with(move |_req: &wiremock::Request| {
            let n = counter_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "files": [{"id": "f1", "name": "draftloom-project-a.json"}],
                    "nextPageToken": "page2"
                }))
            } else {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "files": [{"id": "f2", "name": "draftloom-project-b.json"}]
                }))
            }
        })
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    store.set_account(&account_with("token", None)).await;

    let files = store.list_files("draftloom-project-").await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].id, "f1");
    assert_eq!(files[1].id, "f2");
}

#[tokio::test]
async fn list_files_not_authenticated() {
    let store = DriveStore::new(DriveConfig::default());
    let result = store.list_files("draftloom-project-").await;
    assert!(result.is_err());
}

// ── create_file / update_file ───────────────────────────────────

#[tokio::test]
async fn create_file_uploads_multipart_with_metadata() {
    let server = MockServer::start().await;
    mock_folder_lookup(&server, "folder-1").await;

    let id = ProjectId::new();
    Mock::given(method("POST"))
        .and(path_regex("^/upload/drive/v3/files$"))
        .and(body_string_contains("appProperties"))
        .and(body_string_contains("ciphertext-body"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "created-1",
            "name": project_file_name(id),
            "appProperties": {"revision": "1", "projectId": id.to_string()},
            "modifiedTime": "2025-03-01T12:00:00Z"
        })))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    store.set_account(&account_with("token", None)).await;

    let handle = store
        .create_file(CreateFile {
            name: project_file_name(id),
            content: "ciphertext-body".to_string(),
            mime_type: PROJECT_FILE_MIME.to_string(),
            app_properties: project_file_properties(id, 1, Utc::now()),
        })
        .await
        .unwrap();

    assert_eq!(handle.id, "created-1");
    assert_eq!(handle.app_properties[PROP_REVISION], "1");
}

#[tokio::test]
async fn update_file_patches_existing_file() {
    let server = MockServer::start().await;

    let id = ProjectId::new();
    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/existing-1"))
        .and(body_string_contains("new-ciphertext"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "existing-1",
            "name": project_file_name(id),
            "appProperties": {"revision": "2", "projectId": id.to_string()},
            "modifiedTime": "2025-03-02T09:00:00Z"
        })))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    store.set_account(&account_with("token", None)).await;

    let handle = store
        .update_file(UpdateFile {
            file_id: "existing-1".to_string(),
            content: "new-ciphertext".to_string(),
            mime_type: PROJECT_FILE_MIME.to_string(),
            app_properties: project_file_properties(id, 2, Utc::now()),
        })
        .await
        .unwrap();

    assert_eq!(handle.id, "existing-1");
    assert_eq!(handle.app_properties[PROP_REVISION], "2");
}

#[tokio::test]
async fn update_missing_file_maps_to_remote_file_missing() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    store.set_account(&account_with("token", None)).await;

    let err = store
        .update_file(UpdateFile {
            file_id: "gone".to_string(),
            content: String::new(),
            mime_type: PROJECT_FILE_MIME.to_string(),
            app_properties: Default::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RemoteFileMissing(_)));
}

// ── download ────────────────────────────────────────────────────

#[tokio::test]
async fn download_returns_body_text() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"version\":1}"))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    store.set_account(&account_with("token", None)).await;

    let body = store.download("f1").await.unwrap();
    assert_eq!(body, "{\"version\":1}");
}

#[tokio::test]
async fn download_missing_file_is_distinguishable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    store.set_account(&account_with("token", None)).await;

    let err = store.download("gone").await.unwrap_err();
    assert!(matches!(err, SyncError::RemoteFileMissing(_)));
}

#[tokio::test]
async fn download_server_error_is_network() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    store.set_account(&account_with("token", None)).await;

    let err = store.download("f1").await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
}

// ── Folder bootstrap ────────────────────────────────────────────

#[tokio::test]
async fn missing_sync_folder_is_created() {
    let server = MockServer::start().await;

    // Folder search finds nothing.
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("fields", "files(id,name)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})))
        .mount(&server)
        .await;

    // Folder creation.
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "created-folder",
            "name": "Draftloom"
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Listing inside the created folder.
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageSize", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})))
        .mount(&server)
        .await;

    let store = DriveStore::new(mock_config(&server));
    store.set_account(&account_with("token", None)).await;

    let files = store.list_files("draftloom-project-").await.unwrap();
    assert!(files.is_empty());
}
