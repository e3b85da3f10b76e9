//! Tests for PathGuard and the bounded-input validators.

use gearflow::GearError;
use gearflow::guard::*;

fn guard_with_project() -> (tempfile::TempDir, PathGuard) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("project/nested")).unwrap();
    let guard = PathGuard::new(dir.path()).unwrap();
    (dir, guard)
}

fn assert_invalid_path(result: gearflow::Result<std::path::PathBuf>) {
    match result {
        Err(GearError::InvalidPath { .. }) => {}
        other => panic!("expected InvalidPath, got {:?}", other),
    }
}

// --- validate_directory ---

#[test]
fn relative_directory_resolves_under_root() {
    let (dir, guard) = guard_with_project();
    let resolved = guard.validate_directory("project").unwrap();

    let expected = std::fs::canonicalize(dir.path().join("project")).unwrap();
    assert_eq!(resolved, expected);
    assert!(resolved.is_absolute());
    assert!(resolved.starts_with(guard.allowed_root()));
}

#[test]
fn root_itself_is_allowed() {
    let (_dir, guard) = guard_with_project();
    let resolved = guard.validate_directory(".").unwrap();
    assert_eq!(resolved, guard.allowed_root());
}

#[test]
fn absolute_directory_inside_root_is_allowed() {
    let (dir, guard) = guard_with_project();
    let abs = dir.path().join("project/nested");
    let resolved = guard.validate_directory(abs.to_str().unwrap()).unwrap();
    assert!(resolved.ends_with("project/nested"));
}

#[test]
fn parent_traversal_is_rejected() {
    let (_dir, guard) = guard_with_project();
    assert_invalid_path(guard.validate_directory(".."));
    assert_invalid_path(guard.validate_directory("project/../.."));
    assert_invalid_path(guard.validate_directory("project/nested/../../.."));
    assert_invalid_path(guard.validate_directory("project\\..\\.."));
}

#[test]
fn encoded_traversal_is_rejected() {
    let (_dir, guard) = guard_with_project();
    assert_invalid_path(guard.validate_directory("%2e%2e/etc"));
    assert_invalid_path(guard.validate_directory("project/%2E%2E/%2e%2e"));
    assert_invalid_path(guard.validate_directory("%252e%252e/etc"));
    assert_invalid_path(guard.validate_directory("..%2fetc"));
}

#[test]
fn overlong_utf8_encoding_is_rejected() {
    let (_dir, guard) = guard_with_project();
    assert_invalid_path(guard.validate_directory("%c0%ae%c0%ae/etc"));
}

#[test]
fn empty_and_nul_inputs_are_rejected() {
    let (_dir, guard) = guard_with_project();
    assert_invalid_path(guard.validate_directory(""));
    assert_invalid_path(guard.validate_directory("   "));
    assert_invalid_path(guard.validate_directory("project\0"));
}

#[test]
fn missing_directory_is_rejected() {
    let (_dir, guard) = guard_with_project();
    assert_invalid_path(guard.validate_directory("does-not-exist"));
}

#[test]
fn regular_file_is_rejected() {
    let (dir, guard) = guard_with_project();
    std::fs::write(dir.path().join("file.txt"), "x").unwrap();
    assert_invalid_path(guard.validate_directory("file.txt"));
}

#[test]
fn absolute_path_outside_root_is_rejected() {
    let (_dir, guard) = guard_with_project();
    let other = tempfile::tempdir().unwrap();
    assert_invalid_path(guard.validate_directory(other.path().to_str().unwrap()));
}

#[cfg(unix)]
#[test]
fn symlink_escaping_root_is_rejected() {
    let (dir, guard) = guard_with_project();
    let outside = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
    assert_invalid_path(guard.validate_directory("escape"));
}

#[test]
fn error_names_the_offending_input() {
    let (_dir, guard) = guard_with_project();
    let err = guard.validate_directory("../secret").unwrap_err();
    assert!(err.to_string().contains("../secret"));
}

#[test]
fn missing_root_is_rejected() {
    let result = PathGuard::new("/definitely/not/a/real/root");
    assert!(matches!(result, Err(GearError::InvalidPath { .. })));
}

// --- validate_enum ---

#[test]
fn enum_accepts_listed_value() {
    assert_eq!(validate_enum("json", &["table", "json"], "format").unwrap(), "json");
}

#[test]
fn enum_rejects_unlisted_value() {
    let err = validate_enum("xml", &["table", "json"], "format").unwrap_err();
    match err {
        GearError::InvalidParameter { param, reason } => {
            assert_eq!(param, "format");
            assert!(reason.contains("xml"));
            assert!(reason.contains("table, json"));
        }
        other => panic!("expected InvalidParameter, got {:?}", other),
    }
}

#[test]
fn enum_is_case_sensitive() {
    assert!(validate_enum("JSON", &["table", "json"], "format").is_err());
}

// --- bounded text and lists ---

#[test]
fn bounded_text_counts_characters() {
    let text = "é".repeat(10);
    assert!(validate_bounded_text(&text, 10, "note").is_ok());
    assert!(validate_bounded_text(&text, 9, "note").is_err());
}

#[test]
fn bounded_list_names_the_bad_entry() {
    let values = vec!["ok".to_string(), "too long".to_string()];
    let err = validate_bounded_list(&values, 5, 4, "answers").unwrap_err();
    match err {
        GearError::InvalidParameter { param, .. } => assert_eq!(param, "answers[1]"),
        other => panic!("expected InvalidParameter, got {:?}", other),
    }
}

// --- clarifications ---

#[test]
fn clarification_batch_over_count_rejected() {
    let answers = vec!["yes".to_string(); MAX_CLARIFICATIONS + 1];
    assert!(validate_clarifications(&answers).is_err());
}

#[test]
fn clarification_answer_over_length_rejected() {
    let answers = vec!["x".repeat(MAX_CLARIFICATION_LEN + 1)];
    assert!(validate_clarifications(&answers).is_err());
}

#[test]
fn clarification_batch_at_limits_accepted() {
    let answers = vec!["x".repeat(MAX_CLARIFICATION_LEN); MAX_CLARIFICATIONS];
    assert_eq!(validate_clarifications(&answers).unwrap().len(), 100);
}

#[test]
fn empty_clarification_batch_accepted() {
    let answers: Vec<String> = Vec::new();
    assert!(validate_clarifications(&answers).is_ok());
}

// --- read_bounded_file ---

#[test]
fn bounded_file_within_limit_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("answers.json");
    std::fs::write(&path, r#"["use postgres"]"#).unwrap();

    let data = read_bounded_file(&path, 64, "file").unwrap();
    assert_eq!(data, r#"["use postgres"]"#);
}

#[test]
fn oversized_file_rejected_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roadmap.json");
    std::fs::write(&path, "x".repeat(1024)).unwrap();

    match read_bounded_file(&path, 1023, "file") {
        Err(GearError::InvalidParameter { param, reason }) => {
            assert_eq!(param, "file");
            assert!(reason.contains("1024 bytes"));
        }
        other => panic!("expected InvalidParameter, got {:?}", other),
    }
}

#[test]
fn missing_bounded_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = read_bounded_file(&dir.path().join("nope.json"), 64, "file");
    assert!(matches!(result, Err(GearError::Io { .. })));
}
