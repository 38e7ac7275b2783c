use std::fs;
use std::thread::sleep;
use std::time::Duration;

use tempfile::tempdir;

use super::*;

#[test]
fn visible_entries_lists_only_yaml_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.yaml"), b"").unwrap();
    fs::write(dir.path().join("b.yaml"), b"").unwrap();
    fs::write(dir.path().join("notes.txt"), b"").unwrap();

    let mut names = visible_entries(dir.path());
    names.sort();

    assert_eq!(names, vec!["a.yaml".to_string(), "b.yaml".to_string()]);
}

#[test]
fn visible_entries_skips_hidden_transient_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("task.yaml"), b"").unwrap();
    fs::write(dir.path().join(".task.yaml.reserved"), b"").unwrap();

    let names = visible_entries(dir.path());

    assert_eq!(names, vec!["task.yaml".to_string()]);
}

#[test]
fn visible_entries_on_missing_directory_is_empty() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    assert!(visible_entries(&missing).is_empty());
}

#[test]
fn cleanup_orphans_removes_only_aged_transients() {
    let dir = tempdir().unwrap();
    let stale = dir.path().join(".old.yaml.reserved");
    let fresh = dir.path().join(".new.yaml.reserved");
    fs::write(&stale, b"").unwrap();
    sleep(Duration::from_millis(30));
    fs::write(&fresh, b"").unwrap();

    cleanup_orphans(dir.path(), Duration::from_millis(15));

    assert!(!stale.exists());
    assert!(fresh.exists());
}

#[test]
fn cleanup_orphans_ignores_non_transient_hidden_files() {
    let dir = tempdir().unwrap();
    let unrelated = dir.path().join(".keep");
    fs::write(&unrelated, b"").unwrap();

    cleanup_orphans(dir.path(), Duration::from_secs(0));

    assert!(unrelated.exists());
}

#[test]
fn cleanup_orphans_on_missing_directory_does_not_panic() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    cleanup_orphans(&missing, Duration::from_secs(0));
}
