//! Debounced push scheduling.
//!
//! Every local mutation calls `schedule(project_id)`. Bursts of calls for
//! the same project coalesce into a single push after a quiet window;
//! different projects schedule and execute independently. Nothing here
//! survives a process restart; a pending debounce lost on shutdown is
//! simply rescheduled by the next mutation.

use async_trait::async_trait;
use draftloom_types::ProjectId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Quiet window between the last `schedule` call and the push.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(1500);

/// Receiver of debounced pushes. Implementations report their own
/// failures; the scheduler does not retry.
#[async_trait]
pub trait PushSink: Send + Sync {
    /// Pushes one project.
    async fn push(&self, project_id: ProjectId);
}

/// Per-project single-flight debounce over tokio tasks.
///
/// Each `schedule` call cancels any pending task for that project and
/// starts a fresh one; on expiry the task removes itself from the map and
/// invokes the sink exactly once. At most one pending task exists per
/// project at any time.
pub struct PushScheduler {
    window: Duration,
    pending: Arc<Mutex<HashMap<ProjectId, JoinHandle<()>>>>,
    sink: Arc<dyn PushSink>,
}

impl PushScheduler {
    /// Creates a scheduler with the default quiet window.
    pub fn new(sink: Arc<dyn PushSink>) -> Self {
        Self::with_window(sink, DEFAULT_DEBOUNCE_WINDOW)
    }

    /// Creates a scheduler with an explicit quiet window.
    pub fn with_window(sink: Arc<dyn PushSink>, window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
            sink,
        }
    }

    /// Schedules a push for the project, restarting its quiet window.
    pub fn schedule(&self, project_id: ProjectId) {
        let mut pending = self.pending.lock().unwrap();

        if let Some(handle) = pending.remove(&project_id) {
            handle.abort();
        }

        debug!("Scheduling push for project {}", project_id);

        let sink = Arc::clone(&self.sink);
        let map = Arc::clone(&self.pending);
        let window = self.window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // Leave the map before pushing, so a mutation that lands while
            // the push is in flight schedules a fresh one.
            map.lock().unwrap().remove(&project_id);
            sink.push(project_id).await;
        });

        pending.insert(project_id, handle);
    }

    /// Cancels a pending push for the project, if any.
    pub fn cancel(&self, project_id: ProjectId) {
        if let Some(handle) = self.pending.lock().unwrap().remove(&project_id) {
            handle.abort();
        }
    }

    /// Cancels every pending push (used on disconnect).
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().unwrap();
        for (_, handle) in pending.drain() {
            handle.abort();
        }
    }

    /// Number of pushes currently waiting out their quiet window.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
