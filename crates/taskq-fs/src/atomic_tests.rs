use std::fs;

use tempfile::tempdir;

use super::*;

#[test]
fn write_creates_file_with_exact_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("record.yaml");

    write(&path, b"hello: world\n").unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"hello: world\n");
}

#[test]
fn write_leaves_no_tmp_file_behind_on_success() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("record.yaml");

    write(&path, b"a: 1\n").unwrap();

    assert!(!tmp_path_for(&path).exists());
}

#[test]
fn write_overwrites_existing_file_atomically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("record.yaml");

    write(&path, b"a: 1\n").unwrap();
    write(&path, b"a: 2\n").unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"a: 2\n");
}

#[test]
fn safe_rename_moves_file_within_same_directory() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src.yaml");
    let dst = dir.path().join("dst.yaml");
    fs::write(&src, b"payload").unwrap();

    safe_rename(&src, &dst).unwrap();

    assert!(!src.exists());
    assert_eq!(fs::read(&dst).unwrap(), b"payload");
}

#[test]
fn safe_rename_fails_when_source_is_missing() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("missing.yaml");
    let dst = dir.path().join("dst.yaml");

    let result = safe_rename(&src, &dst);

    assert!(result.is_err());
}
