// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task creation, enumeration and ownership queries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use taskq_core::{Clock, SessionId, TaskRecord};
use taskq_fs::{listing, NamedLock};
use tracing::warn;

const CREATE_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Visible counts across the four primary directories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    pub corrupted: usize,
}

/// Creates and enumerates tasks against a fixed directory layout.
pub struct TaskManager {
    todo_dir: PathBuf,
    in_progress_dir: PathBuf,
    done_dir: PathBuf,
    corrupted_dir: PathBuf,
    lock: NamedLock,
    lock_retries: u32,
    session_id: SessionId,
    clock: std::sync::Arc<dyn Clock>,
}

impl TaskManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        todo_dir: PathBuf,
        in_progress_dir: PathBuf,
        done_dir: PathBuf,
        corrupted_dir: PathBuf,
        lock: NamedLock,
        lock_retries: u32,
        session_id: SessionId,
        clock: std::sync::Arc<dyn Clock>,
    ) -> Self {
        Self {
            todo_dir,
            in_progress_dir,
            done_dir,
            corrupted_dir,
            lock,
            lock_retries,
            session_id,
            clock,
        }
    }

    /// Create a new task from `payload`, merging in the conventional
    /// producer fields. Returns the published filename, or `None` on any
    /// failure (encode, lock, or rename) — the candidate path is cleaned
    /// up before returning.
    pub fn create(&self, payload: TaskRecord, task_id: Option<&str>, created_by: i64) -> Option<String> {
        let filename = match task_id {
            Some(id) => ensure_yaml_suffix(id),
            None => synth_task_id(self.clock.as_ref()),
        };

        let mut record = payload;
        record.set_created_at(self.clock.now());
        record.set_created_by(created_by);
        record.set_retries(0);
        record.set_session_id(self.session_id.as_str());

        let bytes = match record.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "task create: encode failed");
                return None;
            }
        };

        let guard = match self
            .lock
            .acquire("task_create", CREATE_LOCK_TIMEOUT, self.lock_retries)
        {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "task create: lock acquisition failed");
                return None;
            }
        };

        let path = self.todo_dir.join(&filename);
        let result = taskq_fs::atomic::write(&path, &bytes);
        drop(guard);

        match result {
            Ok(()) => Some(filename),
            Err(e) => {
                warn!(error = %e, "task create: write failed");
                None
            }
        }
    }

    /// Visible counts in each of the four primary directories; a missing
    /// directory counts as 0.
    pub fn counts(&self) -> Counts {
        Counts {
            todo: listing::visible_entries(&self.todo_dir).len(),
            in_progress: listing::visible_entries(&self.in_progress_dir).len(),
            done: listing::visible_entries(&self.done_dir).len(),
            corrupted: listing::visible_entries(&self.corrupted_dir).len(),
        }
    }

    /// Visible in-progress tasks owned by `(process_id, session_id)`.
    /// Decode failures are skipped silently — that's recovery's concern.
    pub fn owned_in_progress(&self, process_id: i64, session_id: &str) -> Vec<TaskRecord> {
        decode_visible(&self.in_progress_dir)
            .into_iter()
            .filter(|record| record.is_owned_by(process_id, session_id))
            .collect()
    }

    /// Mapping PID -> count of in-progress tasks owned by that PID.
    /// Tasks with no decodable `process_id` are excluded.
    pub fn by_process_counts(&self) -> HashMap<i64, usize> {
        let mut counts = HashMap::new();
        for record in decode_visible(&self.in_progress_dir) {
            if let Some(pid) = record.process_id() {
                *counts.entry(pid).or_insert(0) += 1;
            }
        }
        counts
    }
}

fn decode_visible(dir: &Path) -> Vec<TaskRecord> {
    listing::visible_entries(dir)
        .into_iter()
        .filter_map(|name| {
            let bytes = std::fs::read(dir.join(&name)).ok()?;
            TaskRecord::decode(&bytes).ok()
        })
        .collect()
}

fn ensure_yaml_suffix(id: &str) -> String {
    if id.ends_with(listing::TASK_SUFFIX) {
        id.to_string()
    } else {
        format!("{id}{}", listing::TASK_SUFFIX)
    }
}

fn synth_task_id(clock: &dyn Clock) -> String {
    let epoch = clock.epoch_ms();
    let rand8: String = {
        use rand::Rng as _;
        let mut rng = rand::rng();
        (0..8)
            .map(|_| std::char::from_digit(rng.random_range(0..16), 16).unwrap_or('0'))
            .collect()
    };
    format!("task_{epoch}_{rand8}{}", listing::TASK_SUFFIX)
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
