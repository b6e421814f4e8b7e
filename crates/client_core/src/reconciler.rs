//! Applies live backend events to the task registry.

use shared::{domain::TaskStatus, protocol::ServerEvent};
use tracing::debug;

use crate::registry::{TaskPatch, TaskRegistry};

/// What the caller should do after an event was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reaction {
    pub changed: bool,
    /// Fetch the full state so terminal tasks move into history.
    pub refresh: bool,
}

/// Every event is an unconditional merge at receipt time; ordering is the
/// transport's job. Events for ids the registry does not know are dropped.
pub fn apply_event(registry: &mut TaskRegistry, event: &ServerEvent) -> Reaction {
    let Some(patch) = patch_for(event) else {
        debug!("reconciler: ignoring unrecognized event kind");
        return Reaction::default();
    };

    if !registry.contains(&patch.id) {
        debug!(id = %patch.id, "reconciler: dropping event for unknown task");
        return Reaction::default();
    }

    let changed = registry.merge_existing(patch);
    Reaction {
        changed,
        refresh: matches!(event, ServerEvent::Completed { .. }),
    }
}

fn patch_for(event: &ServerEvent) -> Option<TaskPatch> {
    let patch = match event {
        ServerEvent::Progress {
            download_id,
            progress,
        } => TaskPatch::new(download_id.clone()).with_progress(*progress),
        ServerEvent::Status {
            download_id,
            status,
        } => TaskPatch::new(download_id.clone()).with_status(*status),
        ServerEvent::Completed {
            download_id,
            file_path,
        } => TaskPatch::new(download_id.clone())
            .with_status(TaskStatus::Completed)
            .with_progress(100.0)
            .with_artifact_path(file_path.clone()),
        ServerEvent::Error { download_id, error } => TaskPatch::new(download_id.clone())
            .with_status(TaskStatus::Error)
            .with_error_detail(error.clone()),
        ServerEvent::MetadataUpdate {
            download_id,
            title,
            artist,
            clean_title,
        } => {
            let mut patch = TaskPatch::new(download_id.clone());
            patch.title = title.clone();
            patch.artist = artist.clone();
            patch.clean_title = clean_title.clone();
            patch
        }
        ServerEvent::Unknown => return None,
    };
    Some(patch)
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
