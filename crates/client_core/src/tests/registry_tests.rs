use super::*;

fn provisional_task(url: &str) -> (TaskId, TaskPatch) {
    let id = TaskId::provisional();
    (id.clone(), TaskPatch::new(id).with_source_url(url))
}

fn authoritative_record(id: &str, status: TaskStatus) -> TaskRecord {
    let mut record = TaskRecord::pending(TaskId::authoritative(id), format!("https://x/{id}"));
    record.status = status;
    record
}

#[test]
fn upsert_inserts_pending_record() {
    let mut registry = TaskRegistry::new();
    let (id, patch) = provisional_task("https://x/a");

    assert!(registry.upsert(patch));

    let record = registry.get(&id).expect("record");
    assert_eq!(record.status, TaskStatus::Pending);
    assert_eq!(record.source_url, "https://x/a");
    assert_eq!(registry.revision(), 1);
}

#[test]
fn upsert_merges_without_clobbering_absent_fields() {
    let mut registry = TaskRegistry::new();
    let (id, patch) = provisional_task("https://x/a");
    registry.upsert(patch);

    let mut metadata = TaskPatch::new(id.clone());
    metadata.title = Some("Artist - Song (Official Video)".into());
    metadata.artist = Some("Artist".into());
    registry.upsert(metadata);
    registry.upsert(TaskPatch::new(id.clone()).with_progress(30.0));

    let record = registry.get(&id).expect("record");
    assert_eq!(record.artist.as_deref(), Some("Artist"));
    assert_eq!(record.progress, 30.0);
    assert_eq!(record.source_url, "https://x/a");
    assert_eq!(registry.len(), 1);
}

#[test]
fn source_url_is_immutable_once_set() {
    let mut registry = TaskRegistry::new();
    let (id, patch) = provisional_task("https://x/a");
    registry.upsert(patch);

    registry.upsert(TaskPatch::new(id.clone()).with_source_url("https://x/other"));

    assert_eq!(registry.get(&id).expect("record").source_url, "https://x/a");
}

#[test]
fn reassign_keeps_position_and_fields() {
    let mut registry = TaskRegistry::new();
    let (first, patch) = provisional_task("https://x/a");
    registry.upsert(patch);
    let (second, patch) = provisional_task("https://x/b");
    registry.upsert(patch);
    let (third, patch) = provisional_task("https://x/c");
    registry.upsert(patch);

    assert!(registry.reassign_id(&second, TaskId::authoritative("t2")));

    let ids: Vec<&TaskId> = registry.active().iter().map(|task| &task.id).collect();
    assert_eq!(ids, vec![&first, &TaskId::authoritative("t2"), &third]);
    let moved = registry.get(&TaskId::authoritative("t2")).expect("moved");
    assert_eq!(moved.source_url, "https://x/b");
    assert!(registry.get(&second).is_none());
}

#[test]
fn reassign_of_unknown_id_is_silent_noop() {
    let mut registry = TaskRegistry::new();
    registry.upsert(TaskPatch::from(authoritative_record("t1", TaskStatus::Pending)));
    let revision = registry.revision();

    assert!(!registry.reassign_id(&TaskId::provisional(), TaskId::authoritative("t9")));

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.revision(), revision);
}

#[test]
fn late_reassign_after_supersede_does_not_duplicate() {
    let mut registry = TaskRegistry::new();
    let (id, patch) = provisional_task("https://x/a");
    registry.upsert(patch);

    assert!(registry.reassign_id(&id, TaskId::authoritative("t1")));
    assert!(!registry.reassign_id(&id, TaskId::authoritative("t1")));

    assert_eq!(registry.len(), 1);
}

#[test]
fn reassign_onto_existing_authoritative_id_drops_placeholder() {
    let mut registry = TaskRegistry::new();
    let (id, patch) = provisional_task("https://x/a");
    registry.upsert(patch);
    // A poll delivered the authoritative record before the acknowledgement.
    registry.upsert(TaskPatch::from(authoritative_record("t1", TaskStatus::Downloading)));

    assert!(registry.reassign_id(&id, TaskId::authoritative("t1")));

    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.get(&TaskId::authoritative("t1")).expect("t1").status,
        TaskStatus::Downloading
    );
}

#[test]
fn remove_drops_only_the_given_record() {
    let mut registry = TaskRegistry::new();
    let (a, patch) = provisional_task("https://x/a");
    registry.upsert(patch);
    let (b, patch) = provisional_task("https://x/b");
    registry.upsert(patch);

    let removed = registry.remove(&a).expect("removed");
    assert_eq!(removed.source_url, "https://x/a");
    assert!(registry.remove(&a).is_none());
    assert!(registry.contains(&b));
}

#[test]
fn terminal_status_is_absorbing() {
    let mut registry = TaskRegistry::new();
    let id = TaskId::authoritative("t1");
    registry.upsert(TaskPatch::new(id.clone()).with_source_url("https://x/a"));
    registry.merge_existing(
        TaskPatch::new(id.clone())
            .with_status(TaskStatus::Completed)
            .with_progress(100.0)
            .with_artifact_path("/x/a.mp3"),
    );

    let changed = registry.merge_existing(
        TaskPatch::new(id.clone())
            .with_status(TaskStatus::Error)
            .with_error_detail("late failure"),
    );
    assert!(!changed);
    registry.merge_existing(TaskPatch::new(id.clone()).with_progress(12.0));

    let record = registry.get(&id).expect("record");
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.progress, 100.0);
    assert!(record.error_detail.is_none());
}

#[test]
fn progress_is_clamped_and_non_finite_ignored() {
    let mut registry = TaskRegistry::new();
    let id = TaskId::authoritative("t1");
    registry.upsert(TaskPatch::new(id.clone()));

    registry.merge_existing(TaskPatch::new(id.clone()).with_progress(140.0));
    assert_eq!(registry.get(&id).expect("record").progress, 100.0);

    registry.merge_existing(TaskPatch::new(id.clone()).with_progress(f64::NAN));
    assert_eq!(registry.get(&id).expect("record").progress, 100.0);

    registry.merge_existing(TaskPatch::new(id.clone()).with_progress(-3.0));
    assert_eq!(registry.get(&id).expect("record").progress, 0.0);
}

#[test]
fn merge_existing_ignores_unknown_ids() {
    let mut registry = TaskRegistry::new();
    assert!(!registry.merge_existing(TaskPatch::new(TaskId::authoritative("ghost")).with_progress(5.0)));
    assert!(registry.is_empty());
    assert_eq!(registry.revision(), 0);
}

#[test]
fn snapshot_replaces_active_but_preserves_unmatched_provisional() {
    let mut registry = TaskRegistry::new();
    registry.upsert(TaskPatch::from(authoritative_record("stale", TaskStatus::Downloading)));
    let (pending, patch) = provisional_task("https://x/new");
    registry.upsert(patch);

    registry.apply_snapshot(
        vec![
            authoritative_record("t1", TaskStatus::Downloading),
            authoritative_record("t2", TaskStatus::Pending),
        ],
        Vec::new(),
    );

    let ids: Vec<&TaskId> = registry.active().iter().map(|task| &task.id).collect();
    assert_eq!(
        ids,
        vec![
            &TaskId::authoritative("t1"),
            &pending,
            &TaskId::authoritative("t2"),
        ]
    );
}

#[test]
fn snapshot_keeps_placeholders_in_their_slots() {
    let mut registry = TaskRegistry::new();
    let (first, patch) = provisional_task("https://x/first");
    registry.upsert(patch);
    registry.upsert(TaskPatch::from(authoritative_record("t1", TaskStatus::Downloading)));
    let (last, patch) = provisional_task("https://x/last");
    registry.upsert(patch);
    let first_before = registry.get(&first).cloned();

    registry.apply_snapshot(
        vec![
            authoritative_record("t1", TaskStatus::Downloading),
            authoritative_record("t2", TaskStatus::Pending),
            authoritative_record("t3", TaskStatus::Pending),
        ],
        Vec::new(),
    );

    let ids: Vec<&TaskId> = registry.active().iter().map(|task| &task.id).collect();
    assert_eq!(
        ids,
        vec![
            &first,
            &TaskId::authoritative("t1"),
            &last,
            &TaskId::authoritative("t2"),
            &TaskId::authoritative("t3"),
        ]
    );
    assert_eq!(registry.get(&first).cloned(), first_before);
}

#[test]
fn snapshot_clamps_placeholder_slot_to_shorter_list() {
    let mut registry = TaskRegistry::new();
    registry.upsert(TaskPatch::from(authoritative_record("gone-1", TaskStatus::Pending)));
    registry.upsert(TaskPatch::from(authoritative_record("gone-2", TaskStatus::Pending)));
    let (pending, patch) = provisional_task("https://x/new");
    registry.upsert(patch);

    registry.apply_snapshot(vec![authoritative_record("t1", TaskStatus::Pending)], Vec::new());

    let ids: Vec<&TaskId> = registry.active().iter().map(|task| &task.id).collect();
    assert_eq!(ids, vec![&TaskId::authoritative("t1"), &pending]);
}

#[test]
fn snapshot_deduplicates_backend_ids() {
    let mut registry = TaskRegistry::new();
    registry.apply_snapshot(
        vec![
            authoritative_record("t1", TaskStatus::Downloading),
            authoritative_record("t1", TaskStatus::Pending),
        ],
        Vec::new(),
    );
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.active()[0].status, TaskStatus::Downloading);
}

#[test]
fn history_is_append_only() {
    let mut registry = TaskRegistry::new();
    let mut first = authoritative_record("h1", TaskStatus::Completed);
    first.artifact_path = Some("/music/h1.mp3".into());
    registry.apply_snapshot(Vec::new(), vec![HistoryEntry::from(first.clone())]);

    let mut rewritten = first.clone();
    rewritten.artifact_path = Some("/elsewhere/h1.mp3".into());
    registry.apply_snapshot(
        Vec::new(),
        vec![
            HistoryEntry::from(rewritten),
            HistoryEntry::from(authoritative_record("h2", TaskStatus::Completed)),
        ],
    );

    let history = registry.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].artifact_path.as_deref(), Some("/music/h1.mp3"));
    assert_eq!(history[1].id, TaskId::authoritative("h2"));
}

#[test]
fn identical_snapshot_does_not_bump_revision() {
    let mut registry = TaskRegistry::new();
    let active = vec![authoritative_record("t1", TaskStatus::Downloading)];
    assert!(registry.apply_snapshot(active.clone(), Vec::new()));
    let revision = registry.revision();

    assert!(!registry.apply_snapshot(active, Vec::new()));
    assert_eq!(registry.revision(), revision);
}

#[test]
fn in_flight_tracks_non_terminal_records() {
    let mut registry = TaskRegistry::new();
    assert!(!registry.has_in_flight());
    registry.apply_snapshot(vec![authoritative_record("t1", TaskStatus::Completed)], Vec::new());
    assert!(!registry.has_in_flight());
    registry.apply_snapshot(vec![authoritative_record("t2", TaskStatus::Pending)], Vec::new());
    assert!(registry.has_in_flight());
}
