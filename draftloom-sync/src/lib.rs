//! Cloud sync engine for Draftloom.
//!
//! Keeps each project consistent across devices through a single
//! encrypted file per project in the user's Google Drive. Conflicts are
//! resolved by whole-snapshot replacement: a per-project revision counter
//! decides which side is authoritative, and the losing side is replaced
//! wholesale. There is no field-level merging.
//!
//! # Architecture
//!
//! - **Cloud**: the [`RemoteStore`] abstraction and its Google Drive
//!   implementation
//! - **Diff**: pure classification of every project into pull, push, or
//!   unchanged, including deduplication of competing remote files
//! - **Pipelines**: encrypt-upload and download-decrypt-apply
//! - **Orchestrator**: full-fleet reconciliation with progress reporting
//! - **Scheduler**: per-project debounce of local mutations into pushes
//! - **Session**: the state machine the UI drives, owning status,
//!   account, and passphrase
//!
//! # Sync flow
//!
//! Local mutation → debounce → push pipeline → snapshot → encrypt →
//! remote write (revision bumped) → metadata update. Remote change →
//! listing → diff engine → pull pipeline → download → decrypt →
//! whole-table apply → metadata update.

pub mod cloud;
pub mod diff;
mod error;
pub mod meta_store;
mod orchestrator;
mod pipeline;
pub mod scheduler;
mod session;
pub mod snapshot;

pub use cloud::{
    parse_project_file_name, project_file_name, project_file_properties, CreateFile, DriveConfig,
    DriveStore, RemoteFileHandle, RemoteStore, UpdateFile, FILE_PREFIX, FILE_SUFFIX,
    PROJECT_FILE_MIME,
};
pub use diff::{
    classify_projects, dedup_remote_entries, CompareBasis, DiffReport, ProjectComparison,
    RemoteIndex, RemoteProjectEntry, SyncDecision,
};
pub use error::{SyncError, SyncResult};
pub use meta_store::{MetaStore, ProjectSyncMeta};
pub use orchestrator::{SyncOrchestrator, SyncPhase, SyncProgress, SyncSummary};
pub use pipeline::{ProjectSync, PushOutcome};
pub use scheduler::{PushScheduler, PushSink, DEFAULT_DEBOUNCE_WINDOW};
pub use session::{
    ErrorKind, PullEvent, SessionRepository, SessionSnapshot, SessionStatus, SyncAccount,
    SyncSession,
};
pub use snapshot::SnapshotStore;
