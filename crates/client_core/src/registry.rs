//! Ordered, keyed store of task records. This is the single place task state
//! lives on the client; everything else reads snapshots of it.

use std::collections::HashSet;

use shared::{
    domain::{TaskId, TaskStatus},
    protocol::{HistoryEntry, TaskRecord},
};
use tracing::debug;

/// Partial update for one task. `None` fields are left untouched on merge.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPatch {
    pub id: TaskId,
    pub source_url: Option<String>,
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub clean_title: Option<String>,
    pub artifact_path: Option<String>,
    pub error_detail: Option<String>,
}

impl TaskPatch {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            source_url: None,
            status: None,
            progress: None,
            title: None,
            artist: None,
            clean_title: None,
            artifact_path: None,
            error_detail: None,
        }
    }

    pub fn with_source_url(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = Some(source_url.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_artifact_path(mut self, artifact_path: impl Into<String>) -> Self {
        self.artifact_path = Some(artifact_path.into());
        self
    }

    pub fn with_error_detail(mut self, error_detail: impl Into<String>) -> Self {
        self.error_detail = Some(error_detail.into());
        self
    }
}

impl From<TaskRecord> for TaskPatch {
    fn from(value: TaskRecord) -> Self {
        Self {
            id: value.id,
            source_url: Some(value.source_url),
            status: Some(value.status),
            progress: Some(value.progress),
            title: value.title,
            artist: value.artist,
            clean_title: value.clean_title,
            artifact_path: value.artifact_path,
            error_detail: value.error_detail,
        }
    }
}

/// Read-only copy of the registry handed to subscribers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegistrySnapshot {
    pub revision: u64,
    pub active: Vec<TaskRecord>,
    pub history: Vec<HistoryEntry>,
}

impl RegistrySnapshot {
    pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.active.iter().find(|task| &task.id == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    active: Vec<TaskRecord>,
    history: Vec<HistoryEntry>,
    revision: u64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.active.iter().find(|task| &task.id == id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.position(id).is_some()
    }

    pub fn active(&self) -> &[TaskRecord] {
        &self.active
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Incremented on every change that alters visible state.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn has_in_flight(&self) -> bool {
        self.active.iter().any(|task| !task.status.is_terminal())
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            revision: self.revision,
            active: self.active.clone(),
            history: self.history.clone(),
        }
    }

    /// Inserts a new record (status `pending` unless the patch says otherwise)
    /// or merges into the existing one.
    pub fn upsert(&mut self, patch: TaskPatch) -> bool {
        if self.contains(&patch.id) {
            return self.merge_existing(patch);
        }

        let mut record = TaskRecord::pending(patch.id.clone(), String::new());
        merge_into(&mut record, patch);
        self.active.push(record);
        self.bump();
        true
    }

    /// Merges only when the id is already known. Returns whether anything
    /// visible changed.
    pub fn merge_existing(&mut self, patch: TaskPatch) -> bool {
        let Some(index) = self.position(&patch.id) else {
            return false;
        };
        let changed = merge_into(&mut self.active[index], patch);
        if changed {
            self.bump();
        }
        changed
    }

    /// Moves the record known as `old` to identity `new`, keeping its slot and
    /// every other field. Unknown `old` is a no-op. When `new` is already
    /// present the `old` record is dropped so the id stays unique.
    pub fn reassign_id(&mut self, old: &TaskId, new: TaskId) -> bool {
        if old == &new {
            return self.contains(old);
        }
        let Some(index) = self.position(old) else {
            debug!(old = %old, new = %new, "registry: reassign for unknown id ignored");
            return false;
        };

        if self.contains(&new) {
            debug!(old = %old, new = %new, "registry: authoritative id already present, dropping placeholder");
            self.active.remove(index);
        } else {
            self.active[index].id = new;
        }
        self.bump();
        true
    }

    pub fn remove(&mut self, id: &TaskId) -> Option<TaskRecord> {
        let index = self.position(id)?;
        let removed = self.active.remove(index);
        self.bump();
        Some(removed)
    }

    /// Replaces the active list with the backend's. Provisional records that
    /// have not been reassigned yet stay untouched at their current slot
    /// (clamped to the new length). History only grows: entries not seen
    /// before are appended, known ones are left as they are.
    pub fn apply_snapshot(&mut self, active: Vec<TaskRecord>, history: Vec<HistoryEntry>) -> bool {
        let mut seen = HashSet::new();
        let mut next: Vec<TaskRecord> = active
            .into_iter()
            .filter(|task| seen.insert(task.id.clone()))
            .collect();
        for (slot, task) in self.active.iter().enumerate() {
            if task.id.is_provisional() && !seen.contains(&task.id) {
                next.insert(slot.min(next.len()), task.clone());
            }
        }

        let mut changed = next != self.active;
        self.active = next;

        let mut known: HashSet<TaskId> = self.history.iter().map(|entry| entry.id.clone()).collect();
        for entry in history {
            if known.insert(entry.id.clone()) {
                self.history.push(entry);
                changed = true;
            }
        }

        if changed {
            self.bump();
        }
        changed
    }

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.active.iter().position(|task| &task.id == id)
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}

fn merge_into(record: &mut TaskRecord, patch: TaskPatch) -> bool {
    let before = record.clone();

    if record.source_url.is_empty() {
        if let Some(source_url) = patch.source_url {
            record.source_url = source_url;
        }
    }

    record.title = patch.title.or(record.title.take());
    record.artist = patch.artist.or(record.artist.take());
    record.clean_title = patch.clean_title.or(record.clean_title.take());

    if let Some(next) = patch.status {
        if !record.status.can_transition_to(next) {
            debug!(
                id = %record.id,
                from = %record.status,
                to = %next,
                "registry: refusing transition out of terminal state"
            );
            return *record != before;
        }
        record.status = next;
    }

    // A terminal record only accepts progress from a patch that re-enters
    // that same state.
    let reenters_status = patch.status == Some(record.status);
    if let Some(progress) = patch.progress.filter(|p| p.is_finite()) {
        if !record.status.is_terminal() || reenters_status {
            record.progress = progress.clamp(0.0, 100.0);
        }
    }

    match record.status {
        TaskStatus::Completed => {
            if let Some(artifact_path) = patch.artifact_path {
                record.artifact_path = Some(artifact_path);
            }
        }
        TaskStatus::Error => {
            if let Some(error_detail) = patch.error_detail {
                record.error_detail = Some(error_detail);
            }
        }
        TaskStatus::Pending | TaskStatus::Downloading => {}
    }

    *record != before
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
