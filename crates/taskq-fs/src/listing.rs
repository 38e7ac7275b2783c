// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory listing and orphan-transient cleanup.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::warn;

/// Canonical suffix for a visible, durable task record.
pub const TASK_SUFFIX: &str = ".yaml";

/// Suffixes used by the transient markers left mid-transition. A failed
/// worker can leave any of these behind; [`cleanup_orphans`] reclaims them
/// once they're older than the configured age.
pub const TRANSIENT_SUFFIXES: &[&str] = &[".reserved", ".completing", ".recovering", ".tmp"];

/// List visible task filenames in `dir`: names ending in [`TASK_SUFFIX`]
/// that do not start with `.`. A missing directory yields an empty list
/// rather than an error — callers treat "no directory yet" the same as
/// "directory exists but is empty".
pub fn visible_entries(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.') && name.ends_with(TASK_SUFFIX))
        .collect()
}

/// Remove hidden transient files in `dir` older than `max_age`, restricted
/// to the known transient suffixes so a stray dotfile some other tool left
/// behind is never touched.
///
/// Best-effort: a directory that doesn't exist, or a file that vanishes
/// mid-scan (another worker reclaimed it first), is not an error.
pub fn cleanup_orphans(dir: &Path, max_age: Duration) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    let now = SystemTime::now();
    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.starts_with('.') {
            continue;
        }
        if !TRANSIENT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if age.is_some_and(|age| age > max_age) {
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!(path = %entry.path().display(), error = %e, "failed to remove orphan transient");
            }
        }
    }
}

#[cfg(test)]
#[path = "listing_tests.rs"]
mod tests;
