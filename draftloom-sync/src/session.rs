//! Session state machine.
//!
//! `SyncSession` is the façade the application root owns: it holds the
//! connection status, the connected account, and the passphrase, and it
//! drives the scheduler, the pipelines, and the orchestrator from UI
//! events. All session state is explicit on this object, none of it in
//! module-scoped globals, and the persisted portion round-trips through
//! the [`SessionRepository`] as one serialized snapshot.

use crate::cloud::storage::{project_file_name, RemoteStore};
use crate::diff::RemoteProjectEntry;
use crate::error::{SyncError, SyncResult};
use crate::meta_store::MetaStore;
use crate::orchestrator::{SyncOrchestrator, SyncProgress, SyncSummary};
use crate::pipeline::ProjectSync;
use crate::scheduler::{PushScheduler, PushSink, DEFAULT_DEBOUNCE_WINDOW};
use crate::snapshot::SnapshotStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use draftloom_crypto::KdfParams;
use draftloom_types::ProjectId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The connected cloud account. One per provider; created on OAuth
/// connect, destroyed on disconnect. Never holds the passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAccount {
    /// Provider-scoped account identifier.
    pub account_id: String,
    /// Account email, when the provider reports one.
    pub email: String,
    /// OAuth access token.
    pub access_token: String,
    /// OAuth refresh token.
    pub refresh_token: Option<String>,
    /// When the access token expires.
    pub expires_at: Option<DateTime<Utc>>,
}

/// The persisted slice of session state, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The connected account.
    pub account: SyncAccount,
    /// The passphrase, present only when the user asked to remember it.
    pub passphrase: Option<String>,
}

/// Durable storage for the session snapshot.
pub trait SessionRepository: Send + Sync {
    /// Loads the persisted snapshot for a provider.
    fn load_session(&self, provider: &str) -> SyncResult<Option<SessionSnapshot>>;
    /// Persists the snapshot for a provider.
    fn save_session(&self, provider: &str, snapshot: &SessionSnapshot) -> SyncResult<()>;
    /// Removes the persisted snapshot for a provider.
    fn clear_session(&self, provider: &str) -> SyncResult<()>;
}

/// Failure kinds surfaced to the UI, each with a short mapped message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No passphrase was provided.
    PassphraseRequired,
    /// No OAuth client id is configured.
    MissingClientId,
    /// The OAuth flow failed.
    OauthFailed,
    /// The consent window could not be opened.
    PopupBlocked,
    /// The provider rejected the redirect URI.
    RedirectUriMismatch,
    /// The provider rejected the grant.
    InvalidGrant,
    /// The access token expired and could not be refreshed.
    TokenExpired,
    /// Catch-all for network, storage, and decrypt failures.
    SyncFailed,
}

impl ErrorKind {
    /// Short human-readable message for the UI boundary.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PassphraseRequired => "Enter your sync passphrase to continue.",
            Self::MissingClientId => "Cloud sync is not configured for this build.",
            Self::OauthFailed => "Google sign-in failed. Please try again.",
            Self::PopupBlocked => "Your browser blocked the sign-in window.",
            Self::RedirectUriMismatch => "Sign-in is misconfigured (redirect mismatch).",
            Self::InvalidGrant => "Your sign-in expired. Please reconnect.",
            Self::TokenExpired => "Your session expired. Please reconnect.",
            Self::SyncFailed => "Sync failed. Check your connection and try again.",
        }
    }
}

impl From<&SyncError> for ErrorKind {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::PassphraseRequired => Self::PassphraseRequired,
            SyncError::MissingClientId => Self::MissingClientId,
            SyncError::Oauth(_) => Self::OauthFailed,
            SyncError::PopupBlocked => Self::PopupBlocked,
            SyncError::RedirectUriMismatch => Self::RedirectUriMismatch,
            SyncError::InvalidGrant => Self::InvalidGrant,
            SyncError::TokenExpired => Self::TokenExpired,
            // Decrypt failures land here too, alongside network and
            // storage problems; the cause stays on the SyncError itself.
            SyncError::Network(_)
            | SyncError::Storage(_)
            | SyncError::Serialization(_)
            | SyncError::Crypto(_)
            | SyncError::RemoteFileMissing(_)
            | SyncError::SyncFailed(_) => Self::SyncFailed,
        }
    }
}

/// Connection status exposed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No account connected.
    Disconnected,
    /// OAuth flow in progress.
    Connecting,
    /// Account connected, idle.
    Connected,
    /// A fleet sync is running.
    Syncing,
    /// A failure occurred; retry via user action.
    Error(ErrorKind),
}

/// Events on the stream returned by [`SyncSession::start_pull`]. Exactly
/// one terminal event is sent, then the channel closes.
#[derive(Debug, Clone)]
pub enum PullEvent {
    /// The pull task started.
    Started { project_id: ProjectId },
    /// The local copy is already at (or past) the remote revision.
    AlreadyCurrent,
    /// Simulation result: the remote is strictly ahead.
    RemoteAhead { revision: i64 },
    /// The snapshot was downloaded, decrypted, and applied.
    Applied { revision: i64 },
    /// The pull failed.
    Failed { message: String },
}

impl PullEvent {
    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started { .. })
    }
}

/// Pushes scheduled by the debouncer run through this sink, which reads
/// the passphrase at fire time and records failures on the session
/// status.
struct SessionPushSink {
    sync: Arc<ProjectSync>,
    passphrase: Arc<RwLock<Option<String>>>,
    status: Arc<RwLock<SessionStatus>>,
}

#[async_trait]
impl PushSink for SessionPushSink {
    async fn push(&self, project_id: ProjectId) {
        let passphrase = self.passphrase.read().unwrap().clone();
        let Some(passphrase) = passphrase else {
            warn!("Skipping scheduled push for {}: no passphrase", project_id);
            return;
        };

        if let Err(e) = self.sync.push(project_id, &passphrase).await {
            warn!("Scheduled push for {} failed: {}", project_id, e);
            *self.status.write().unwrap() = SessionStatus::Error(ErrorKind::from(&e));
        }
    }
}

/// The sync façade owned by the application root.
pub struct SyncSession {
    remote: Arc<dyn RemoteStore>,
    sync: Arc<ProjectSync>,
    orchestrator: SyncOrchestrator,
    scheduler: PushScheduler,
    repo: Arc<dyn SessionRepository>,
    status: Arc<RwLock<SessionStatus>>,
    account: Arc<RwLock<Option<SyncAccount>>>,
    passphrase: Arc<RwLock<Option<String>>>,
    remember: AtomicBool,
}

impl SyncSession {
    /// Creates a session with the default debounce window and KDF
    /// parameters.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        snapshots: Arc<dyn SnapshotStore>,
        meta: Arc<MetaStore>,
    ) -> Self {
        Self::with_options(
            remote,
            snapshots,
            meta,
            DEFAULT_DEBOUNCE_WINDOW,
            KdfParams::default(),
        )
    }

    /// Creates a session with explicit tuning (tests shorten the window
    /// and use fast KDF parameters).
    pub fn with_options(
        remote: Arc<dyn RemoteStore>,
        snapshots: Arc<dyn SnapshotStore>,
        meta: Arc<MetaStore>,
        debounce_window: Duration,
        kdf: KdfParams,
    ) -> Self {
        let sync = Arc::new(ProjectSync::with_kdf_params(
            Arc::clone(&remote),
            Arc::clone(&snapshots),
            Arc::clone(&meta),
            kdf,
        ));
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&remote),
            Arc::clone(&snapshots),
            Arc::clone(&meta),
            Arc::clone(&sync),
        );

        let status = Arc::new(RwLock::new(SessionStatus::Disconnected));
        let passphrase = Arc::new(RwLock::new(None));

        let sink = Arc::new(SessionPushSink {
            sync: Arc::clone(&sync),
            passphrase: Arc::clone(&passphrase),
            status: Arc::clone(&status),
        });
        let scheduler = PushScheduler::with_window(sink, debounce_window);

        Self {
            remote,
            sync,
            orchestrator,
            scheduler,
            repo: meta,
            status,
            account: Arc::new(RwLock::new(None)),
            passphrase,
            remember: AtomicBool::new(false),
        }
    }

    /// Current connection status.
    pub fn status(&self) -> SessionStatus {
        *self.status.read().unwrap()
    }

    /// The connected account, if any.
    pub fn account(&self) -> Option<SyncAccount> {
        self.account.read().unwrap().clone()
    }

    fn provider(&self) -> &'static str {
        self.remote.provider_name()
    }

    fn set_error(&self, err: &SyncError) {
        *self.status.write().unwrap() = SessionStatus::Error(ErrorKind::from(err));
    }

    /// Restores session state persisted by a previous run. When an
    /// account record exists the session optimistically reports
    /// `Connected` without revalidating the token; the next network call
    /// surfaces any staleness.
    pub async fn restore(&self) -> SyncResult<()> {
        let Some(snapshot) = self.repo.load_session(self.provider())? else {
            return Ok(());
        };

        self.remote.set_account(&snapshot.account).await;
        *self.account.write().unwrap() = Some(snapshot.account);
        self.remember
            .store(snapshot.passphrase.is_some(), Ordering::Relaxed);
        *self.passphrase.write().unwrap() = snapshot.passphrase;
        *self.status.write().unwrap() = SessionStatus::Connected;

        debug!("Restored session for provider {}", self.provider());
        Ok(())
    }

    /// Starts the connect flow. Validates the passphrase and the OAuth
    /// client configuration, then returns the consent URL the UI must
    /// open. The session stays in `Connecting` until
    /// [`connect_complete`](Self::connect_complete) or a reported
    /// failure.
    pub async fn connect_begin(&self, passphrase: &str, remember: bool) -> SyncResult<String> {
        if passphrase.is_empty() {
            let err = SyncError::PassphraseRequired;
            self.set_error(&err);
            return Err(err);
        }

        *self.status.write().unwrap() = SessionStatus::Connecting;
        *self.passphrase.write().unwrap() = Some(passphrase.to_string());
        self.remember.store(remember, Ordering::Relaxed);

        match self.remote.begin_auth().await {
            Ok(url) => Ok(url),
            Err(e) => {
                self.set_error(&e);
                Err(e)
            }
        }
    }

    /// Completes the connect flow with the authorization code, persists
    /// the session snapshot, and immediately reconciles the whole fleet.
    pub async fn connect_complete(&self, auth_code: &str) -> SyncResult<SyncSummary> {
        let account = match self.remote.complete_auth(auth_code).await {
            Ok(account) => account,
            Err(e) => {
                self.set_error(&e);
                return Err(e);
            }
        };

        let passphrase = self.passphrase.read().unwrap().clone();
        let snapshot = SessionSnapshot {
            account: account.clone(),
            passphrase: if self.remember.load(Ordering::Relaxed) {
                passphrase
            } else {
                None
            },
        };
        if let Err(e) = self.repo.save_session(self.provider(), &snapshot) {
            self.set_error(&e);
            return Err(e);
        }

        *self.account.write().unwrap() = Some(account);
        *self.status.write().unwrap() = SessionStatus::Connected;

        self.sync_all().await
    }

    /// Records that the UI shell could not open the consent window.
    pub fn report_popup_blocked(&self) {
        self.set_error(&SyncError::PopupBlocked);
    }

    /// Disconnects: clears stored tokens and the persisted session, and
    /// drops the passphrase unless the user asked to remember it.
    pub async fn disconnect(&self) -> SyncResult<()> {
        self.scheduler.cancel_all();
        self.repo.clear_session(self.provider())?;
        self.remote.clear_account().await;
        *self.account.write().unwrap() = None;

        if !self.remember.load(Ordering::Relaxed) {
            *self.passphrase.write().unwrap() = None;
        }

        *self.status.write().unwrap() = SessionStatus::Disconnected;
        Ok(())
    }

    fn require_passphrase(&self) -> SyncResult<String> {
        self.passphrase
            .read()
            .unwrap()
            .clone()
            .ok_or(SyncError::PassphraseRequired)
    }

    /// Reconciles every project, reporting progress on the given channel.
    pub async fn sync_all_with_progress(
        &self,
        progress: Option<mpsc::Sender<SyncProgress>>,
    ) -> SyncResult<SyncSummary> {
        let passphrase = match self.require_passphrase() {
            Ok(p) => p,
            Err(e) => {
                self.set_error(&e);
                return Err(e);
            }
        };

        *self.status.write().unwrap() = SessionStatus::Syncing;

        match self.orchestrator.sync_all(&passphrase, progress).await {
            Ok(summary) => {
                *self.status.write().unwrap() = SessionStatus::Connected;
                Ok(summary)
            }
            Err(e) => {
                self.set_error(&e);
                Err(e)
            }
        }
    }

    /// Reconciles every project without progress reporting.
    pub async fn sync_all(&self) -> SyncResult<SyncSummary> {
        self.sync_all_with_progress(None).await
    }

    /// Debounces a push for the project. Called by every local mutation;
    /// ignored while no account is connected.
    pub fn schedule_push(&self, project_id: ProjectId) {
        match self.status() {
            SessionStatus::Disconnected | SessionStatus::Connecting => {
                debug!("Ignoring push for {}: not connected", project_id);
            }
            _ => self.scheduler.schedule(project_id),
        }
    }

    /// Returns whether the remote revision strictly exceeds the local one.
    pub async fn check_remote_diff(&self, project_id: ProjectId) -> SyncResult<bool> {
        self.sync.check_remote_diff(project_id).await
    }

    /// Starts a pull of one project, returning a bounded event stream.
    ///
    /// Exactly one terminal event arrives ([`PullEvent::AlreadyCurrent`],
    /// [`PullEvent::RemoteAhead`], [`PullEvent::Applied`], or
    /// [`PullEvent::Failed`]), after which the channel closes. Dropping
    /// the receiver cancels the remaining work. With `simulate` the
    /// remote is only inspected, never downloaded or applied.
    pub fn start_pull(&self, project_id: ProjectId, simulate: bool) -> mpsc::Receiver<PullEvent> {
        let (tx, rx) = mpsc::channel(8);

        let remote = Arc::clone(&self.remote);
        let sync = Arc::clone(&self.sync);
        let status = Arc::clone(&self.status);
        let passphrase = self.passphrase.read().unwrap().clone();

        tokio::spawn(async move {
            let send = |event: PullEvent| {
                let tx = tx.clone();
                async move { tx.send(event).await.is_ok() }
            };

            if !send(PullEvent::Started { project_id }).await {
                return;
            }

            let outcome = Self::run_pull(&remote, &sync, project_id, simulate, passphrase).await;
            let event = match outcome {
                Ok(event) => event,
                Err(e) => {
                    *status.write().unwrap() = SessionStatus::Error(ErrorKind::from(&e));
                    PullEvent::Failed {
                        message: e.to_string(),
                    }
                }
            };
            debug_assert!(event.is_terminal());
            let _ = send(event).await;
        });

        rx
    }

    async fn run_pull(
        remote: &Arc<dyn RemoteStore>,
        sync: &Arc<ProjectSync>,
        project_id: ProjectId,
        simulate: bool,
        passphrase: Option<String>,
    ) -> SyncResult<PullEvent> {
        let name = project_file_name(project_id);
        let handle = remote
            .find_file(&name)
            .await?
            .ok_or_else(|| SyncError::RemoteFileMissing(name.clone()))?;
        let entry = RemoteProjectEntry::from_handle(&handle)
            .ok_or_else(|| SyncError::RemoteFileMissing(name))?;

        let local_revision = sync.local_revision(project_id)?;
        if entry.revision <= local_revision {
            return Ok(PullEvent::AlreadyCurrent);
        }

        if simulate {
            return Ok(PullEvent::RemoteAhead {
                revision: entry.revision,
            });
        }

        let passphrase = passphrase.ok_or(SyncError::PassphraseRequired)?;
        sync.pull_from_file(&entry, &passphrase).await?;
        Ok(PullEvent::Applied {
            revision: entry.revision,
        })
    }
}
