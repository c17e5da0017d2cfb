//! Revision and diff engine.
//!
//! Pure decision logic: given the remote listing, the local project list,
//! and the stored metadata, classify every project id as pull, push, or
//! unchanged. No I/O happens here; the pipelines and the orchestrator act
//! on the report this module produces.

use crate::cloud::storage::{
    parse_project_file_name, RemoteFileHandle, PROP_PROJECT_ID, PROP_REVISION, PROP_UPDATED_AT,
};
use crate::meta_store::ProjectSyncMeta;
use chrono::{DateTime, Utc};
use draftloom_types::{LocalProject, ProjectId};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// A project's remote file, reduced to what reconciliation needs.
/// Derived from a [`RemoteFileHandle`], never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProjectEntry {
    /// The project this file belongs to.
    pub project_id: ProjectId,
    /// Remote file id.
    pub file_id: String,
    /// Revision recorded in the file's metadata (0 when absent).
    pub revision: i64,
    /// Upload timestamp from metadata, falling back to the provider's
    /// modified time.
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteProjectEntry {
    /// Extracts an entry from a remote file handle.
    ///
    /// The project id comes from the file's metadata when present, else
    /// from the file name. Files matching neither are not project files
    /// and yield `None`.
    pub fn from_handle(handle: &RemoteFileHandle) -> Option<Self> {
        let project_id = handle
            .app_properties
            .get(PROP_PROJECT_ID)
            .and_then(|s| ProjectId::parse(s).ok())
            .or_else(|| parse_project_file_name(&handle.name))?;

        let revision = handle
            .app_properties
            .get(PROP_REVISION)
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        let updated_at = handle
            .app_properties
            .get(PROP_UPDATED_AT)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .or(handle.modified_time);

        Some(Self {
            project_id,
            file_id: handle.id.clone(),
            revision,
            updated_at,
        })
    }
}

/// Remote entries after deduplication: one winner per project id, with
/// the losing duplicates kept aside for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct RemoteIndex {
    /// The winning entry per project.
    pub winners: HashMap<ProjectId, RemoteProjectEntry>,
    /// Losing duplicates, per project. Never deleted remotely.
    pub duplicates: HashMap<ProjectId, Vec<RemoteProjectEntry>>,
}

/// Deduplicates competing remote files for the same project.
///
/// The winner is the entry with the highest revision; ties break to the
/// later `updated_at`; remaining ties keep the first-seen entry, so the
/// result is deterministic for a given input order.
pub fn dedup_remote_entries(entries: Vec<RemoteProjectEntry>) -> RemoteIndex {
    let mut index = RemoteIndex::default();

    for entry in entries {
        let project_id = entry.project_id;
        match index.winners.entry(project_id) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(mut slot) => {
                let winner = slot.get_mut();
                let beats = entry.revision > winner.revision
                    || (entry.revision == winner.revision && entry.updated_at > winner.updated_at);
                let loser = if beats {
                    std::mem::replace(winner, entry)
                } else {
                    entry
                };
                index.duplicates.entry(project_id).or_default().push(loser);
            }
        }
    }

    for (project_id, losers) in &index.duplicates {
        warn!(
            "Found {} duplicate remote file(s) for project {}",
            losers.len(),
            project_id
        );
    }

    index
}

/// What to do with a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Remote is authoritative: download and apply.
    Pull,
    /// Local is authoritative: encrypt and upload.
    Push,
    /// Both sides are at the same revision.
    Unchanged,
}

/// What the decision was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareBasis {
    /// Project exists only remotely.
    RemoteOnly,
    /// Project exists only locally.
    LocalOnly,
    /// Both sides present, compared by revision counter.
    Revision,
    /// Both sides present but never synced from this device; compared by
    /// modification timestamps.
    Timestamp,
}

/// One project's comparison outcome.
#[derive(Debug, Clone)]
pub struct ProjectComparison {
    /// The project id.
    pub project_id: ProjectId,
    /// The decision.
    pub decision: SyncDecision,
    /// How the decision was reached.
    pub basis: CompareBasis,
    /// Revision of the winning remote entry, if a remote file exists.
    pub remote_revision: Option<i64>,
    /// Revision stored in local metadata, if a row exists.
    pub local_revision: Option<i64>,
}

/// The full classification of every known project id.
///
/// The five bucket vectors partition the id set: every id appears in
/// exactly one of them.
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    /// Per-project outcomes, in id order.
    pub comparisons: Vec<ProjectComparison>,
    /// Both sides present, remote ahead.
    pub to_pull: Vec<ProjectId>,
    /// Both sides present, local ahead.
    pub to_push: Vec<ProjectId>,
    /// Both sides present, same revision.
    pub unchanged: Vec<ProjectId>,
    /// Present only remotely.
    pub remote_only: Vec<ProjectId>,
    /// Present only locally.
    pub local_only: Vec<ProjectId>,
    /// Losing remote duplicates, carried over from the [`RemoteIndex`].
    pub duplicates: HashMap<ProjectId, Vec<RemoteProjectEntry>>,
}

/// Classifies every project id into exactly one bucket.
///
/// Both-present projects with a metadata row compare by revision (the
/// version counter always outranks wall-clock time). Without a metadata
/// row (first sync of a project that already exists on both sides) the
/// engine falls back to comparing the remote upload time against the
/// local modification time, and pulls only when the remote is strictly
/// newer. That fallback is a heuristic: two devices that both edited a
/// never-synced project fully offline will silently overwrite one
/// another on their next sync; no merge is attempted.
pub fn classify_projects(
    index: &RemoteIndex,
    local: &[LocalProject],
    meta: &HashMap<ProjectId, ProjectSyncMeta>,
) -> DiffReport {
    let local_by_id: HashMap<ProjectId, &LocalProject> =
        local.iter().map(|p| (p.id, p)).collect();

    let all_ids: BTreeSet<ProjectId> = index
        .winners
        .keys()
        .copied()
        .chain(local_by_id.keys().copied())
        .collect();

    let mut report = DiffReport {
        duplicates: index.duplicates.clone(),
        ..Default::default()
    };

    for project_id in all_ids {
        let remote = index.winners.get(&project_id);
        let local_project = local_by_id.get(&project_id);
        let meta_row = meta.get(&project_id);

        let (decision, basis) = match (remote, local_project) {
            (Some(_), None) => (SyncDecision::Pull, CompareBasis::RemoteOnly),
            (None, Some(_)) => (SyncDecision::Push, CompareBasis::LocalOnly),
            (Some(remote), Some(local_project)) => match meta_row {
                Some(m) => {
                    let decision = if remote.revision > m.revision {
                        SyncDecision::Pull
                    } else if remote.revision < m.revision {
                        SyncDecision::Push
                    } else {
                        SyncDecision::Unchanged
                    };
                    (decision, CompareBasis::Revision)
                }
                None => {
                    let remote_newer = remote
                        .updated_at
                        .is_some_and(|ts| ts > local_project.updated_at);
                    let decision = if remote_newer {
                        SyncDecision::Pull
                    } else {
                        SyncDecision::Push
                    };
                    (decision, CompareBasis::Timestamp)
                }
            },
            (None, None) => unreachable!("id came from one of the two sets"),
        };

        let bucket = match basis {
            CompareBasis::RemoteOnly => &mut report.remote_only,
            CompareBasis::LocalOnly => &mut report.local_only,
            _ => match decision {
                SyncDecision::Pull => &mut report.to_pull,
                SyncDecision::Push => &mut report.to_push,
                SyncDecision::Unchanged => &mut report.unchanged,
            },
        };
        bucket.push(project_id);

        report.comparisons.push(ProjectComparison {
            project_id,
            decision,
            basis,
            remote_revision: remote.map(|r| r.revision),
            local_revision: meta_row.map(|m| m.revision),
        });
    }

    report
}
