//! Tests for StateStore implementations: JsonStateStore and MemoryStateStore.

use std::sync::Arc;

use chrono::Utc;
use gearflow::GearError;
use gearflow::state::json_store::{DEFAULT_STATE_FILE, JsonStateStore, StoreOptions};
use gearflow::state::memory_store::MemoryStateStore;
use gearflow::state::transitions::{self, StageOutput};
use gearflow::state::types::*;
use gearflow::state::{StateStore, load_or_new};

fn start(stage: Stage) -> gearflow::state::Mutator {
    Box::new(move |s| transitions::start_stage(s, stage, Utc::now()))
}

fn complete(stage: Stage) -> gearflow::state::Mutator {
    Box::new(move |s| transitions::complete_stage(s, stage, StageOutput::default(), Utc::now()))
}

fn identity() -> gearflow::state::Mutator {
    Box::new(|s: WorkflowState| -> gearflow::Result<WorkflowState> { Ok(s) })
}

fn tmp_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.contains(".tmp."))
        .collect()
}

// ===== JsonStateStore =====

#[tokio::test]
async fn json_store_load_missing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());

    let err = store.load().await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn json_store_load_or_new_returns_zero_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());

    let state = load_or_new(&store).await.unwrap();
    assert_eq!(state.revision, 0);
    assert_eq!(state.current_stage, Stage::None);
    assert!(!store.state_path().exists());
}

#[tokio::test]
async fn json_store_first_update_creates_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());

    let state = store.update(start(Stage::Analyze)).await.unwrap();
    assert_eq!(state.revision, 1);
    assert_eq!(state.current_stage, Stage::Analyze);
    assert_eq!(store.state_path(), dir.path().join(DEFAULT_STATE_FILE));
    assert!(store.state_path().exists());
    assert!(store.backups().await.unwrap().is_empty());
}

#[tokio::test]
async fn json_store_creates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a/b");
    let store = JsonStateStore::new(&nested);

    store.update(identity()).await.unwrap();
    assert!(nested.join(DEFAULT_STATE_FILE).exists());
}

#[tokio::test]
async fn json_store_round_trip_matches_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    store.update(identity()).await.unwrap();

    let prior = store.load().await.unwrap();
    let now = Utc::now();
    let updated = store
        .update(Box::new(move |s| transitions::start_stage(s, Stage::Analyze, now)))
        .await
        .unwrap();
    let loaded = store.load().await.unwrap();
    assert_eq!(loaded, updated);

    let mut expected = transitions::start_stage(prior.clone(), Stage::Analyze, now).unwrap();
    expected.revision = prior.revision + 1;
    expected.updated_at = loaded.updated_at;
    assert_eq!(loaded, expected);
}

#[tokio::test]
async fn json_store_document_is_camel_case_json() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    store.update(complete(Stage::Analyze)).await.unwrap();

    let raw = std::fs::read_to_string(store.state_path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["currentStage"], "reverse-engineer");
    assert_eq!(value["completedStages"], serde_json::json!(["analyze"]));
    assert_eq!(value["revision"], 1);
}

#[tokio::test]
async fn json_store_failed_mutation_leaves_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    store.update(complete(Stage::Analyze)).await.unwrap();
    let before = std::fs::read(store.state_path()).unwrap();

    let result = store.update(complete(Stage::Implement)).await;
    assert!(matches!(result, Err(GearError::InvalidTransition(_))));

    assert_eq!(std::fs::read(store.state_path()).unwrap(), before);
    assert!(tmp_files(dir.path()).is_empty());
}

#[tokio::test]
async fn json_store_rejects_invariant_breaking_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    store.update(complete(Stage::Analyze)).await.unwrap();

    let result = store
        .update(Box::new(
            |mut s: WorkflowState| -> gearflow::Result<WorkflowState> {
                s.completed_stages.clear();
                s.stage_details.clear();
                s.current_stage = Stage::None;
                Ok(s)
            },
        ))
        .await;
    assert!(matches!(result, Err(GearError::InvalidTransition(_))));
    assert_eq!(store.load().await.unwrap().completed_stages, vec![Stage::Analyze]);
}

#[tokio::test]
async fn json_store_write_temp_leaves_canonical_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    let original = store.update(identity()).await.unwrap();

    let next = transitions::start_stage(original.clone(), Stage::Analyze, Utc::now()).unwrap();
    let tmp = store.write_temp(&next).await.unwrap();

    assert!(tmp.exists());
    assert!(
        tmp.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".gearflow-state.json.tmp.")
    );
    assert_eq!(store.load().await.unwrap(), original);

    store.commit(&tmp).await.unwrap();
    assert!(!tmp.exists());
    assert_eq!(store.load().await.unwrap().current_stage, Stage::Analyze);
}

// --- backups ---

#[tokio::test]
async fn json_store_keeps_at_most_three_backups() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());

    for _ in 0..6 {
        store.update(identity()).await.unwrap();
    }

    let backups = store.backups().await.unwrap();
    assert_eq!(backups.len(), 3);

    // Oldest first; the newest holds the revision before the last update.
    let revisions: Vec<u64> = backups
        .iter()
        .map(|p| {
            let raw = std::fs::read_to_string(p).unwrap();
            serde_json::from_str::<WorkflowState>(&raw).unwrap().revision
        })
        .collect();
    assert_eq!(revisions, vec![3, 4, 5]);
}

#[tokio::test]
async fn json_store_respects_custom_backup_count() {
    let dir = tempfile::tempdir().unwrap();
    let options = StoreOptions {
        max_backups: 1,
        ..StoreOptions::default()
    };
    let store = JsonStateStore::with_options(dir.path(), options);

    for _ in 0..4 {
        store.update(identity()).await.unwrap();
    }
    assert_eq!(store.backups().await.unwrap().len(), 1);
}

fn backup_contents(store: &JsonStateStore) -> Vec<(std::path::PathBuf, String)> {
    let dir = store.state_path().parent().unwrap().to_path_buf();
    let mut backups: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().contains(".bak."))
        .collect();
    backups.sort();
    backups
        .into_iter()
        .map(|p| {
            let raw = std::fs::read_to_string(&p).unwrap();
            (p, raw)
        })
        .collect()
}

#[tokio::test]
async fn json_store_refused_update_keeps_backups() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    store.update(complete(Stage::Analyze)).await.unwrap();
    store.update(complete(Stage::ReverseEngineer)).await.unwrap();
    store.update(complete(Stage::CreateSpecs)).await.unwrap();
    store.update(identity()).await.unwrap();

    // A ceiling the current document fits under but a larger one does not.
    let size = std::fs::metadata(store.state_path()).unwrap().len();
    let options = StoreOptions {
        max_bytes: size + 64,
        ..StoreOptions::default()
    };
    let tight = JsonStateStore::with_options(dir.path(), options);

    let before = backup_contents(&tight);
    assert_eq!(before.len(), 3);
    let document = std::fs::read_to_string(tight.state_path()).unwrap();

    for _ in 0..3 {
        let err = tight
            .update(Box::new(|s| {
                let output = StageOutput {
                    artifacts: vec!["x".repeat(4096)],
                    ..StageOutput::default()
                };
                transitions::complete_stage(s, Stage::GapAnalysis, output, Utc::now())
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, GearError::TooLarge { .. }));
    }

    assert_eq!(backup_contents(&tight), before);
    assert_eq!(std::fs::read_to_string(tight.state_path()).unwrap(), document);
    assert!(tmp_files(dir.path()).is_empty());
}

#[tokio::test]
async fn json_store_rejected_mutation_keeps_backups() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    store.update(identity()).await.unwrap();
    store.update(identity()).await.unwrap();
    let before = backup_contents(&store);

    let result = store.update(complete(Stage::Implement)).await;
    assert!(matches!(result, Err(GearError::InvalidTransition(_))));
    assert_eq!(backup_contents(&store), before);
}

// --- recovery ---

#[tokio::test]
async fn json_store_recovers_from_newest_backup() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    store.update(complete(Stage::Analyze)).await.unwrap();
    store.update(start(Stage::ReverseEngineer)).await.unwrap();

    std::fs::write(store.state_path(), "{ not json").unwrap();

    let recovered = store.load().await.unwrap();
    assert_eq!(recovered.revision, 1);
    assert_eq!(recovered.completed_stages, vec![Stage::Analyze]);

    // The damaged document is kept aside and the canonical one restored.
    let quarantined = store.quarantined().await.unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(std::fs::read_to_string(&quarantined[0]).unwrap(), "{ not json");
    assert_eq!(store.load().await.unwrap(), recovered);
}

#[tokio::test]
async fn json_store_skips_damaged_backups() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    for _ in 0..3 {
        store.update(identity()).await.unwrap();
    }

    let backups = store.backups().await.unwrap();
    assert_eq!(backups.len(), 2);
    std::fs::write(backups.last().unwrap(), "garbage").unwrap();
    std::fs::write(store.state_path(), "garbage").unwrap();

    let recovered = store.load().await.unwrap();
    assert_eq!(recovered.revision, 1);
}

#[tokio::test]
async fn json_store_corrupted_without_backup_is_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    std::fs::write(store.state_path(), "{ not json").unwrap();

    let err = store.load().await.unwrap_err();
    let GearError::Corrupted { quarantined, .. } = &err else {
        panic!("expected Corrupted, got {:?}", err);
    };
    assert!(quarantined.exists());
    assert!(
        quarantined
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".gearflow-state.json.corrupted.")
    );
    assert!(err.to_string().contains(&quarantined.display().to_string()));
    assert!(!store.state_path().exists());

    // With the bad document gone, the next load starts clean.
    assert!(store.load().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn json_store_schema_violation_is_corrupted() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    let doc = serde_json::json!({
        "schemaVersion": 1,
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z",
        "currentStage": "deploy",
        "completedStages": [],
        "stageDetails": {}
    });
    std::fs::write(store.state_path(), doc.to_string()).unwrap();

    let err = store.load().await.unwrap_err();
    assert!(matches!(err, GearError::Corrupted { .. }));
}

#[tokio::test]
async fn json_store_invariant_violation_is_corrupted() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    let doc = serde_json::json!({
        "schemaVersion": 1,
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z",
        "currentStage": "done",
        "completedStages": ["implement"],
        "stageDetails": {}
    });
    std::fs::write(store.state_path(), doc.to_string()).unwrap();

    let err = store.load().await.unwrap_err();
    assert!(matches!(err, GearError::Corrupted { .. }));
}

#[tokio::test]
async fn json_store_newer_schema_is_left_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    let doc = serde_json::json!({
        "schemaVersion": 99,
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z",
        "currentStage": "none",
        "completedStages": [],
        "stageDetails": {}
    });
    std::fs::write(store.state_path(), doc.to_string()).unwrap();

    let err = store.load().await.unwrap_err();
    assert!(matches!(
        err,
        GearError::UnsupportedSchema {
            found: 99,
            supported: 1,
            ..
        }
    ));
    assert!(store.state_path().exists());
    assert!(store.quarantined().await.unwrap().is_empty());
}

// --- size ceiling ---

#[tokio::test]
async fn json_store_oversized_document_is_not_read() {
    let dir = tempfile::tempdir().unwrap();
    JsonStateStore::new(dir.path())
        .update(identity())
        .await
        .unwrap();

    let options = StoreOptions {
        max_bytes: 16,
        ..StoreOptions::default()
    };
    let store = JsonStateStore::with_options(dir.path(), options);

    let err = store.load().await.unwrap_err();
    assert!(matches!(err, GearError::TooLarge { limit: 16, .. }));
    assert!(store.state_path().exists());
}

#[tokio::test]
async fn json_store_oversized_write_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let options = StoreOptions {
        max_bytes: 16,
        ..StoreOptions::default()
    };
    let store = JsonStateStore::with_options(dir.path(), options);

    let err = store.update(identity()).await.unwrap_err();
    assert!(matches!(err, GearError::TooLarge { .. }));
    assert!(!store.state_path().exists());
    assert!(tmp_files(dir.path()).is_empty());
}

// --- optimistic concurrency ---

#[tokio::test]
async fn json_store_revision_check() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());

    let first = store.update_if_revision(0, identity()).await.unwrap();
    assert_eq!(first.revision, 1);

    let err = store.update_if_revision(0, identity()).await.unwrap_err();
    assert!(matches!(
        err,
        GearError::RevisionConflict {
            expected: 0,
            actual: 1
        }
    ));

    let second = store.update_if_revision(1, identity()).await.unwrap();
    assert_eq!(second.revision, 2);
}

#[tokio::test]
async fn json_store_concurrent_updates_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStateStore::new(dir.path()));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.update(identity()).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.load().await.unwrap().revision, 10);
    assert!(store.backups().await.unwrap().len() <= 3);
    assert!(tmp_files(dir.path()).is_empty());
}

// --- reset ---

#[tokio::test]
async fn json_store_reset_archives_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    store.update(complete(Stage::Analyze)).await.unwrap();

    let archived = store.reset().await.unwrap().unwrap();
    assert!(archived.exists());
    assert!(archived.to_string_lossy().contains(".archived."));
    assert!(store.load().await.unwrap_err().is_not_found());

    let fresh = store.update(identity()).await.unwrap();
    assert_eq!(fresh.revision, 1);
    assert!(fresh.completed_stages.is_empty());
}

#[tokio::test]
async fn json_store_reset_without_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new(dir.path());
    assert!(store.reset().await.unwrap().is_none());
}

// ===== MemoryStateStore =====

#[tokio::test]
async fn memory_store_load_missing_is_not_found() {
    let store = MemoryStateStore::new();
    assert!(store.load().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn memory_store_update_and_load() {
    let store = MemoryStateStore::new();
    store.update(complete(Stage::Analyze)).await.unwrap();
    let state = store.update(start(Stage::ReverseEngineer)).await.unwrap();

    assert_eq!(state.revision, 2);
    assert_eq!(store.load().await.unwrap(), state);
}

#[tokio::test]
async fn memory_store_applies_same_rules() {
    let store = MemoryStateStore::new();
    store
        .update(Box::new(|s| transitions::set_route(s, Route::Greenfield)))
        .await
        .unwrap();

    let result = store
        .update(Box::new(|s| transitions::set_route(s, Route::Brownfield)))
        .await;
    assert!(matches!(result, Err(GearError::InvalidTransition(_))));

    let err = store.update_if_revision(7, identity()).await.unwrap_err();
    assert!(matches!(err, GearError::RevisionConflict { actual: 1, .. }));
}

#[tokio::test]
async fn memory_store_refuses_skipping_stages_without_override() {
    let store = MemoryStateStore::new();
    let result = store
        .update(Box::new(|s: WorkflowState| -> gearflow::Result<WorkflowState> {
            let now = Utc::now();
            let s = transitions::complete_stage(s, Stage::Analyze, StageOutput::default(), now)?;
            transitions::complete_stage(s, Stage::ReverseEngineer, StageOutput::default(), now)
        }))
        .await;
    assert!(matches!(result, Err(GearError::InvalidTransition(_))));
    assert!(store.load().await.unwrap_err().is_not_found());

    store
        .update(Box::new(|s| {
            transitions::override_stage(s, Stage::GapAnalysis, Utc::now())
        }))
        .await
        .unwrap();
    assert_eq!(store.load().await.unwrap().completed_stages.len(), 3);
}

#[tokio::test]
async fn memory_store_reset_archives_in_memory() {
    let store = MemoryStateStore::new();
    store.update(identity()).await.unwrap();

    assert!(store.reset().await.unwrap().is_none());
    assert!(store.load().await.unwrap_err().is_not_found());
    assert_eq!(store.archived().await.len(), 1);
}

#[tokio::test]
async fn memory_store_with_invalid_state_rejected() {
    let mut state = WorkflowState::new(Utc::now());
    state.completed_stages.push(Stage::Implement);
    assert!(MemoryStateStore::with_state(state).is_err());
}
