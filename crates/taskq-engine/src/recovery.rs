// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scans `in_progress/`, classifies staleness, republishes stale work.
//!
//! Ownership is inferred, never asserted twice: a session whose heartbeat
//! is within the window and whose PID probe succeeds is trusted; anything
//! else is reclaimed. Reclaiming a task that is in fact still alive
//! produces bounded duplication rather than lost work, which is the trade
//! this system makes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Duration as ChronoDuration;
use taskq_core::{Clock, TaskRecord};
use taskq_fs::{listing, NamedLock};
use tracing::{debug, warn};

use crate::probe;

const STALE_CHECK_LOCK_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Recovers abandoned in-progress work back to `todo/`.
pub struct RecoveryEngine {
    status_dir: PathBuf,
    in_progress_dir: PathBuf,
    todo_dir: PathBuf,
    lock: NamedLock,
    lock_retries: u32,
    staleness_window: ChronoDuration,
    clock: std::sync::Arc<dyn Clock>,
}

impl RecoveryEngine {
    pub fn new(
        status_dir: PathBuf,
        in_progress_dir: PathBuf,
        todo_dir: PathBuf,
        lock: NamedLock,
        lock_retries: u32,
        staleness_window: ChronoDuration,
        clock: std::sync::Arc<dyn Clock>,
    ) -> Self {
        Self {
            status_dir,
            in_progress_dir,
            todo_dir,
            lock,
            lock_retries,
            staleness_window,
            clock,
        }
    }

    /// Scan `in_progress/`, reclaim stale entries back to `todo/`, and
    /// return the count recovered. Never raises: lock-acquisition failure
    /// and per-entry failures both reduce to "skip and continue".
    pub fn recover_stale(&self, _current_session: &str, current_host: &str, current_pid: i64) -> usize {
        let active_sessions = self.active_session_set();

        let guard = match self.lock.acquire(
            "stale_check",
            STALE_CHECK_LOCK_TIMEOUT,
            self.lock_retries,
        ) {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "recovery: stale_check lock acquisition failed");
                return 0;
            }
        };

        let mut recovered = 0;
        for name in listing::visible_entries(&self.in_progress_dir) {
            let path = self.in_progress_dir.join(&name);
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            let Ok(record) = TaskRecord::decode(&bytes) else {
                continue;
            };

            if !self.is_stale(&record, &active_sessions, current_host) {
                continue;
            }

            if self.reclaim(&name, record, current_pid) {
                recovered += 1;
            }
        }

        drop(guard);
        recovered
    }

    fn is_stale(&self, record: &TaskRecord, active_sessions: &HashSet<String>, current_host: &str) -> bool {
        if let Some(session_id) = record.session_id() {
            if !active_sessions.contains(session_id) {
                return true;
            }
        }

        if let Some(pid) = record.process_id() {
            let owned_locally = record
                .host()
                .map(|h| h.eq_ignore_ascii_case(current_host))
                .unwrap_or(false);
            if owned_locally && !probe::alive(pid, record.host(), current_host) {
                return true;
            }
        }

        match record.started_at() {
            Some(started) => self.clock.now() - started > self.staleness_window,
            None => true,
        }
    }

    /// Rename to the `.recovering` marker, stamp the abandonment trace, and
    /// atomic-write back into `todo/`. A failed rename skips the entry; any
    /// other failure in the sequence is logged and the marker is left for
    /// the orphan-cleanup pass to reclaim later.
    fn reclaim(&self, name: &str, mut record: TaskRecord, current_pid: i64) -> bool {
        let source = self.in_progress_dir.join(name);
        let marker = self.in_progress_dir.join(format!(".{name}.recovering"));

        if taskq_fs::atomic::safe_rename(&source, &marker).is_err() {
            debug!(task = name, "recovery: rename to .recovering failed, skipping");
            return false;
        }

        record.mark_stale("Stale task recovery", current_pid, self.clock.now());

        let bytes = match record.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(task = name, error = %e, "recovery: encode failed after marking stale");
                return false;
            }
        };

        let dest = self.todo_dir.join(name);
        if let Err(e) = taskq_fs::atomic::write(&dest, &bytes) {
            warn!(task = name, error = %e, "recovery: republish to todo failed");
            return false;
        }

        let _ = std::fs::remove_file(&marker);
        true
    }

    /// A session is active iff both its heartbeat file's mtime and its
    /// decoded `last_beat` are within the staleness window. Missing or
    /// unparseable fields exclude the session — absence of proof of life
    /// is treated as death.
    fn active_session_set(&self) -> HashSet<String> {
        let mut active = HashSet::new();
        let now = self.clock.now();

        let entries = match std::fs::read_dir(&self.status_dir) {
            Ok(entries) => entries,
            Err(_) => return active,
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.ends_with(".heartbeat") {
                continue;
            }

            let Some(mtime_age) = mtime_age(&entry.path(), now) else {
                continue;
            };
            if mtime_age > self.staleness_window {
                continue;
            }

            let Ok(bytes) = std::fs::read(entry.path()) else {
                continue;
            };
            let Ok(record) = TaskRecord::decode(&bytes) else {
                continue;
            };

            let last_beat_age = match last_beat(&record) {
                Some(last_beat) => now - last_beat,
                None => continue,
            };
            if last_beat_age > self.staleness_window {
                continue;
            }

            if let Some(session_id) = name.strip_suffix(".heartbeat") {
                active.insert(session_id.to_string());
            }
        }

        active
    }
}

fn mtime_age(path: &Path, now: chrono::DateTime<chrono::Utc>) -> Option<ChronoDuration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let modified: chrono::DateTime<chrono::Utc> = modified.into();
    Some(now - modified)
}

fn last_beat(record: &TaskRecord) -> Option<chrono::DateTime<chrono::Utc>> {
    record
        .fields()
        .get(serde_yaml::Value::String("last_beat".into()))
        .and_then(serde_yaml::Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
