//! Google Drive remote store implementation.
//!
//! Uses Google Drive API v3 for file operations. Project files live in a
//! dedicated sync folder and carry their sync metadata as `appProperties`.

use super::storage::{CreateFile, RemoteFileHandle, RemoteStore, UpdateFile};
use crate::error::{SyncError, SyncResult};
use crate::session::SyncAccount;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

/// Google Drive specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Redirect URI for the OAuth flow.
    pub redirect_uri: String,
    /// The folder path within Drive for project files.
    pub sync_folder: String,
    /// Base URL for the Drive API (e.g. `https://www.googleapis.com`).
    pub api_base_url: String,
    /// Base URL for Google OAuth2 (e.g. `https://oauth2.googleapis.com`).
    pub oauth_base_url: String,
    /// Base URL for the Google Accounts auth page.
    pub auth_base_url: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "urn:ietf:wg:oauth:2.0:oob".to_string(),
            sync_folder: "Draftloom".to_string(),
            api_base_url: "https://www.googleapis.com".to_string(),
            oauth_base_url: "https://oauth2.googleapis.com".to_string(),
            auth_base_url: "https://accounts.google.com".to_string(),
        }
    }
}

/// OAuth2 tokens.
#[derive(Debug, Clone)]
struct OAuthTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Drive API response structures.
#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(rename = "appProperties")]
    app_properties: Option<HashMap<String, String>>,
    #[serde(rename = "modifiedTime")]
    modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AboutResponse {
    user: AboutUser,
}

#[derive(Debug, Deserialize)]
struct AboutUser {
    #[serde(rename = "permissionId")]
    permission_id: String,
    #[serde(rename = "emailAddress")]
    email_address: Option<String>,
}

/// Fields requested for every file the engine touches.
const FILE_FIELDS: &str = "id,name,appProperties,modifiedTime";

/// Google Drive remote store.
pub struct DriveStore {
    config: DriveConfig,
    client: Client,
    tokens: RwLock<Option<OAuthTokens>>,
    sync_folder_id: RwLock<Option<String>>,
}

impl DriveStore {
    /// Creates a new Drive store.
    pub fn new(config: DriveConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to create HTTP client");

        Self {
            config,
            client,
            tokens: RwLock::new(None),
            sync_folder_id: RwLock::new(None),
        }
    }

    /// Builds the OAuth2 authorization URL.
    fn auth_url(&self) -> String {
        let scope = "https://www.googleapis.com/auth/drive.file";
        format!(
            "{}/o/oauth2/v2/auth?\
            client_id={}&\
            redirect_uri={}&\
            response_type=code&\
            scope={}&\
            access_type=offline&\
            prompt=consent",
            self.config.auth_base_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(scope)
        )
    }

    /// Maps an OAuth error body to the most specific error variant.
    fn oauth_error(body: &str) -> SyncError {
        if body.contains("invalid_grant") {
            SyncError::InvalidGrant
        } else if body.contains("redirect_uri_mismatch") {
            SyncError::RedirectUriMismatch
        } else {
            SyncError::Oauth(body.to_string())
        }
    }

    /// Gets the current access token, refreshing if expired.
    async fn get_access_token(&self) -> SyncResult<String> {
        let (access_token, expired) = {
            let guard = self.tokens.read().unwrap();
            let tokens = guard
                .as_ref()
                .ok_or_else(|| SyncError::Oauth("not authenticated".to_string()))?;

            let expired = tokens.expires_at.is_some_and(|exp| Utc::now() > exp);
            (tokens.access_token.clone(), expired)
        }; // read lock dropped here

        if expired {
            return self.refresh_token().await;
        }

        Ok(access_token)
    }

    /// Refreshes the access token.
    async fn refresh_token(&self) -> SyncResult<String> {
        let refresh_token = self
            .tokens
            .read()
            .unwrap()
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or(SyncError::TokenExpired)?;

        debug!("Refreshing Drive access token");

        let response = self
            .client
            .post(format!("{}/token", self.config.oauth_base_url))
            .form(&[
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("refresh_token", &refresh_token),
                ("grant_type", &"refresh_token".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("token refresh failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(Self::oauth_error(&error));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Oauth(format!("failed to parse token response: {e}")))?;

        let expires_at = token_response
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds((secs - 60).max(0))); // 60s buffer

        let new_tokens = OAuthTokens {
            access_token: token_response.access_token.clone(),
            // Keep the old refresh token if the provider omitted a new one.
            refresh_token: token_response.refresh_token.or(Some(refresh_token)),
            expires_at,
        };

        *self.tokens.write().unwrap() = Some(new_tokens);

        Ok(token_response.access_token)
    }

    /// Finds or creates the sync folder, walking the configured path.
    async fn get_or_create_sync_folder(&self) -> SyncResult<String> {
        // Check cache first
        if let Some(folder_id) = self.sync_folder_id.read().unwrap().as_ref() {
            return Ok(folder_id.clone());
        }

        let access_token = self.get_access_token().await?;
        let folder_parts: Vec<&str> = self.config.sync_folder.split('/').collect();

        let mut parent_id = "root".to_string();

        for folder_name in folder_parts {
            if folder_name.is_empty() {
                continue;
            }

            let query = format!(
                "name = '{}' and mimeType = 'application/vnd.google-apps.folder' and '{}' in parents and trashed = false",
                folder_name, parent_id
            );

            let response = self
                .client
                .get(format!("{}/drive/v3/files", self.config.api_base_url))
                .bearer_auth(&access_token)
                .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
                .send()
                .await
                .map_err(|e| SyncError::Network(format!("folder search failed: {e}")))?;

            let file_list: DriveFileList = response
                .json()
                .await
                .map_err(|e| SyncError::Network(format!("failed to parse folder list: {e}")))?;

            if let Some(folder) = file_list.files.first() {
                parent_id = folder.id.clone();
            } else {
                let metadata = serde_json::json!({
                    "name": folder_name,
                    "mimeType": "application/vnd.google-apps.folder",
                    "parents": [parent_id]
                });

                let response = self
                    .client
                    .post(format!("{}/drive/v3/files", self.config.api_base_url))
                    .bearer_auth(&access_token)
                    .json(&metadata)
                    .send()
                    .await
                    .map_err(|e| SyncError::Network(format!("folder creation failed: {e}")))?;

                if !response.status().is_success() {
                    let error = response.text().await.unwrap_or_default();
                    return Err(SyncError::Network(format!(
                        "failed to create folder: {error}"
                    )));
                }

                let created: DriveFile = response.json().await.map_err(|e| {
                    SyncError::Network(format!("failed to parse created folder: {e}"))
                })?;

                info!("Created sync folder: {}", folder_name);
                parent_id = created.id;
            }
        }

        *self.sync_folder_id.write().unwrap() = Some(parent_id.clone());
        Ok(parent_id)
    }

    /// Looks up the connected account's identity.
    async fn fetch_account_identity(&self, access_token: &str) -> SyncResult<AboutUser> {
        let response = self
            .client
            .get(format!("{}/drive/v3/about", self.config.api_base_url))
            .bearer_auth(access_token)
            .query(&[("fields", "user(permissionId,emailAddress)")])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("account lookup failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Oauth(format!("account lookup failed: {error}")));
        }

        let about: AboutResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Oauth(format!("failed to parse account info: {e}")))?;

        Ok(about.user)
    }

    fn to_handle(file: DriveFile) -> RemoteFileHandle {
        let modified_time = file
            .modified_time
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|dt| dt.with_timezone(&Utc));

        RemoteFileHandle {
            id: file.id,
            name: file.name,
            app_properties: file.app_properties.unwrap_or_default(),
            modified_time,
        }
    }

    /// Builds a multipart/related body: a JSON metadata part followed by
    /// the file content part.
    fn multipart_body(boundary: &str, metadata: &serde_json::Value, mime: &str, content: &str) -> String {
        format!(
            "--{boundary}\r\n\
             Content-Type: application/json; charset=UTF-8\r\n\r\n\
             {metadata}\r\n\
             --{boundary}\r\n\
             Content-Type: {mime}\r\n\r\n\
             {content}\r\n\
             --{boundary}--"
        )
    }

    async fn query_files(&self, query: &str) -> SyncResult<Vec<RemoteFileHandle>> {
        let access_token = self.get_access_token().await?;

        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let fields = format!("nextPageToken,files({FILE_FIELDS})");
            let mut request = self
                .client
                .get(format!("{}/drive/v3/files", self.config.api_base_url))
                .bearer_auth(&access_token)
                .query(&[
                    ("q", query),
                    ("fields", fields.as_str()),
                    ("pageSize", "100"),
                ]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SyncError::Network(format!("file list failed: {e}")))?;

            if !response.status().is_success() {
                let error = response.text().await.unwrap_or_default();
                return Err(SyncError::Network(format!("file list failed: {error}")));
            }

            let file_list: DriveFileList = response
                .json()
                .await
                .map_err(|e| SyncError::Network(format!("failed to parse file list: {e}")))?;

            all_files.extend(file_list.files.into_iter().map(Self::to_handle));

            page_token = file_list.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(all_files)
    }
}

const MULTIPART_BOUNDARY: &str = "draftloom_boundary";

#[async_trait]
impl RemoteStore for DriveStore {
    fn provider_name(&self) -> &'static str {
        "google-drive"
    }

    fn is_authenticated(&self) -> bool {
        self.tokens.read().unwrap().is_some()
    }

    async fn begin_auth(&self) -> SyncResult<String> {
        if self.config.client_id.is_empty() {
            return Err(SyncError::MissingClientId);
        }
        Ok(self.auth_url())
    }

    async fn complete_auth(&self, auth_code: &str) -> SyncResult<SyncAccount> {
        debug!("Exchanging auth code for tokens");

        let response = self
            .client
            .post(format!("{}/token", self.config.oauth_base_url))
            .form(&[
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("code", &auth_code.to_string()),
                ("redirect_uri", &self.config.redirect_uri),
                ("grant_type", &"authorization_code".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("token exchange failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(Self::oauth_error(&error));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Oauth(format!("failed to parse token response: {e}")))?;

        let expires_at = token_response
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds((secs - 60).max(0)));

        let user = self
            .fetch_account_identity(&token_response.access_token)
            .await?;

        let tokens = OAuthTokens {
            access_token: token_response.access_token.clone(),
            refresh_token: token_response.refresh_token.clone(),
            expires_at,
        };
        *self.tokens.write().unwrap() = Some(tokens);

        info!("Google Drive authentication successful");

        Ok(SyncAccount {
            account_id: user.permission_id,
            email: user.email_address.unwrap_or_default(),
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_at,
        })
    }

    async fn set_account(&self, account: &SyncAccount) {
        let tokens = OAuthTokens {
            access_token: account.access_token.clone(),
            refresh_token: account.refresh_token.clone(),
            expires_at: account.expires_at,
        };
        *self.tokens.write().unwrap() = Some(tokens);
    }

    async fn clear_account(&self) {
        *self.tokens.write().unwrap() = None;
        *self.sync_folder_id.write().unwrap() = None;
    }

    async fn find_file(&self, name: &str) -> SyncResult<Option<RemoteFileHandle>> {
        let folder_id = self.get_or_create_sync_folder().await?;
        let query = format!("name = '{name}' and '{folder_id}' in parents and trashed = false");
        let files = self.query_files(&query).await?;
        Ok(files.into_iter().next())
    }

    async fn list_files(&self, prefix: &str) -> SyncResult<Vec<RemoteFileHandle>> {
        let folder_id = self.get_or_create_sync_folder().await?;
        let query = format!(
            "name contains '{prefix}' and '{folder_id}' in parents and trashed = false \
             and mimeType != 'application/vnd.google-apps.folder'"
        );
        self.query_files(&query).await
    }

    async fn download(&self, file_id: &str) -> SyncResult<String> {
        let access_token = self.get_access_token().await?;

        debug!("Downloading file: {}", file_id);

        let response = self
            .client
            .get(format!(
                "{}/drive/v3/files/{}?alt=media",
                self.config.api_base_url, file_id
            ))
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("download failed: {e}")))?;

        if response.status().as_u16() == 404 {
            return Err(SyncError::RemoteFileMissing(file_id.to_string()));
        }

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Network(format!("download failed: {error}")));
        }

        response
            .text()
            .await
            .map_err(|e| SyncError::Network(format!("read download body failed: {e}")))
    }

    async fn create_file(&self, req: CreateFile) -> SyncResult<RemoteFileHandle> {
        let access_token = self.get_access_token().await?;
        let folder_id = self.get_or_create_sync_folder().await?;

        debug!("Uploading file: {} ({} bytes)", req.name, req.content.len());

        let metadata = serde_json::json!({
            "name": req.name,
            "mimeType": req.mime_type,
            "parents": [folder_id],
            "appProperties": req.app_properties,
        });

        let body =
            Self::multipart_body(MULTIPART_BOUNDARY, &metadata, &req.mime_type, &req.content);

        let url = format!(
            "{}/upload/drive/v3/files?uploadType=multipart&fields={FILE_FIELDS}",
            self.config.api_base_url
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&access_token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("upload failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Network(format!("upload failed: {error}")));
        }

        let file: DriveFile = response
            .json()
            .await
            .map_err(|e| SyncError::Network(format!("parse upload response failed: {e}")))?;

        info!("Uploaded file: {} (id: {})", req.name, file.id);
        Ok(Self::to_handle(file))
    }

    async fn update_file(&self, req: UpdateFile) -> SyncResult<RemoteFileHandle> {
        let access_token = self.get_access_token().await?;

        debug!(
            "Updating file: {} ({} bytes)",
            req.file_id,
            req.content.len()
        );

        let metadata = serde_json::json!({
            "mimeType": req.mime_type,
            "appProperties": req.app_properties,
        });

        let body =
            Self::multipart_body(MULTIPART_BOUNDARY, &metadata, &req.mime_type, &req.content);

        let url = format!(
            "{}/upload/drive/v3/files/{}?uploadType=multipart&fields={FILE_FIELDS}",
            self.config.api_base_url, req.file_id
        );
        let response = self
            .client
            .patch(url)
            .bearer_auth(&access_token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("update failed: {e}")))?;

        if response.status().as_u16() == 404 {
            return Err(SyncError::RemoteFileMissing(req.file_id));
        }

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Network(format!("update failed: {error}")));
        }

        let file: DriveFile = response
            .json()
            .await
            .map_err(|e| SyncError::Network(format!("parse update response failed: {e}")))?;

        info!("Updated file: {} (id: {})", file.name, file.id);
        Ok(Self::to_handle(file))
    }
}
