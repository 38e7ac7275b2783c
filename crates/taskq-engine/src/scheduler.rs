// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler: owns identity and the directory layout, and exposes the
//! public claim/complete/progress operations as single state-machine
//! transitions. Every operation here folds its internal errors into
//! `Option`/`bool` at the boundary — nothing escapes as a raised error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_yaml::Value;
use taskq_core::{Clock, SessionId, SystemClock, TaskRecord, TaskqError};
use taskq_fs::{listing, NamedLock};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::heartbeat::HeartbeatPublisher;
use crate::manager::{Counts, TaskManager};
use crate::recovery::RecoveryEngine;

const TODO_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const TASK_MOVE_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const TASK_DONE_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const PROGRESS_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// A task record paired with the filename that identifies it on disk.
/// [`TaskRecord`] itself carries no identity — a task's filename is a
/// property of its location in the directory tree, not of its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub filename: String,
    pub record: TaskRecord,
}

/// One scheduler instance: a session with a fixed identity, running
/// against a fixed directory tree.
pub struct Scheduler {
    config: SchedulerConfig,
    session_id: SessionId,
    process_id: i64,
    hostname: String,
    start_time: std::time::Instant,
    lock: NamedLock,
    clock: Arc<dyn Clock>,
    manager: TaskManager,
    recovery: RecoveryEngine,
    shutdown: Arc<AtomicBool>,
    heartbeat: Option<HeartbeatPublisher>,
}

impl Scheduler {
    /// Construct a scheduler, creating the six subdirectories if missing,
    /// and starting the heartbeat publisher.
    pub fn new(config: SchedulerConfig) -> Result<Self, TaskqError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Construct with an injected clock, for deterministic tests of
    /// staleness windows without a real sleep.
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self, TaskqError> {
        for dir in config.all_dirs() {
            std::fs::create_dir_all(&dir)?;
        }

        let session_id = SessionId::generate();
        let process_id = std::process::id() as i64;
        let hostname = local_hostname();
        let lock = NamedLock::new(config.locks_dir());

        let manager = TaskManager::new(
            config.todo_dir(),
            config.in_progress_dir(),
            config.done_dir(),
            config.corrupted_dir(),
            lock.clone(),
            config.lock_retries,
            session_id.clone(),
            Arc::clone(&clock),
        );

        let recovery = RecoveryEngine::new(
            config.status_dir(),
            config.in_progress_dir(),
            config.todo_dir(),
            lock.clone(),
            config.lock_retries,
            config.staleness_window(),
            Arc::clone(&clock),
        );

        let heartbeat = HeartbeatPublisher::spawn(
            config.status_dir(),
            session_id.clone(),
            process_id,
            hostname.clone(),
            config.heartbeat_interval(),
            Arc::clone(&clock),
        );

        info!(session_id = %session_id, process_id, hostname = %hostname, "scheduler started");

        Ok(Self {
            config,
            session_id,
            process_id,
            hostname,
            start_time: std::time::Instant::now(),
            lock,
            clock,
            manager,
            recovery,
            shutdown: Arc::new(AtomicBool::new(false)),
            heartbeat: Some(heartbeat),
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn process_id(&self) -> i64 {
        self.process_id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Cooperative shutdown flag, shareable across schedulers in the same
    /// process that want to shut down together: only one instance per
    /// process installs the OS signal handlers; the rest observe this.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Install process-global SIGTERM/SIGINT handlers. Only one scheduler
    /// per process should call this. On receipt they set
    /// [`Self::shutdown_flag`], unlink this session's heartbeat file, and
    /// exit with `128 + signum`.
    pub fn install_signal_handlers(&self) -> std::io::Result<()> {
        let heartbeat_path = self
            .config
            .status_dir()
            .join(format!("{}.heartbeat", self.session_id));
        crate::signals::install(self.shutdown_flag(), heartbeat_path)
    }

    /// Create a new task. See [`TaskManager::create`].
    pub fn create(&self, payload: TaskRecord, task_id: Option<&str>) -> Option<String> {
        self.manager.create(payload, task_id, self.process_id)
    }

    pub fn counts(&self) -> Counts {
        self.manager.counts()
    }

    pub fn owned_in_progress(&self) -> Vec<TaskRecord> {
        self.manager
            .owned_in_progress(self.process_id, self.session_id.as_str())
    }

    pub fn by_process_counts(&self) -> std::collections::HashMap<i64, usize> {
        self.manager.by_process_counts()
    }

    /// Invoke the recovery engine directly.
    pub fn recover_stale(&self) -> usize {
        self.recovery
            .recover_stale(self.session_id.as_str(), &self.hostname, self.process_id)
    }

    /// Claim the highest-priority visible todo task, without reserving it.
    /// Returns `None` on shutdown, on an empty queue, or on any internal
    /// error (non-fatal by contract).
    pub fn claim_next(&self, check_stale: bool) -> Option<Task> {
        if self.is_shutting_down() {
            return None;
        }

        listing::cleanup_orphans(&self.config.todo_dir(), self.config.orphan_age());

        if check_stale {
            self.recover_stale();
        }

        let guard = self
            .lock
            .acquire("todo_lock", TODO_LOCK_TIMEOUT, self.config.lock_retries)
            .ok()?;

        let names = listing::visible_entries(&self.config.todo_dir());
        drop(guard);

        pick_highest_priority(&self.config.todo_dir(), names)
    }

    /// Reserve and transfer `task` (as returned by [`Self::claim_next`])
    /// into `in_progress/`, stamping ownership. Returns `None` if another
    /// worker won the race, or on any failure — best-effort rollback is
    /// attempted in that case.
    pub fn move_to_in_progress(&self, task: &Task) -> Option<Task> {
        let filename = task.filename.as_str();
        let guard = self
            .lock
            .acquire("task_move", TASK_MOVE_LOCK_TIMEOUT, self.config.lock_retries)
            .ok()?;

        let source = self.config.todo_dir().join(filename);
        if !source.exists() {
            drop(guard);
            return None;
        }

        let reserved = self.config.todo_dir().join(format!(".{filename}.reserved"));

        if taskq_fs::atomic::safe_rename(&source, &reserved).is_err() {
            drop(guard);
            return None;
        }

        let result = (|| -> Option<TaskRecord> {
            let bytes = std::fs::read(&reserved).ok()?;
            let mut record = TaskRecord::decode(&bytes).ok()?;
            record.mark_started(self.process_id, &self.hostname, self.session_id.as_str(), self.clock.now());
            let bytes = record.encode().ok()?;
            let dest = self.config.in_progress_dir().join(filename);
            taskq_fs::atomic::write(&dest, &bytes).ok()?;
            Some(record)
        })();

        match result {
            Some(record) => {
                let _ = std::fs::remove_file(&reserved);
                drop(guard);
                Some(Task {
                    filename: filename.to_string(),
                    record,
                })
            }
            None => {
                // Best-effort rollback to the original todo/<name> path.
                let _ = taskq_fs::atomic::safe_rename(&reserved, &source);
                drop(guard);
                None
            }
        }
    }

    /// Finalize `task` into `done/`, stamping terminal fields. Returns
    /// `false` on failure, rolling back to `in_progress/`.
    pub fn move_to_done(
        &self,
        task: &Task,
        success: bool,
        results: Option<Value>,
        error: Option<&str>,
    ) -> bool {
        let task_filename = task.filename.as_str();
        let guard = match self
            .lock
            .acquire("task_done", TASK_DONE_LOCK_TIMEOUT, self.config.lock_retries)
        {
            Ok(guard) => guard,
            Err(e) => {
                warn!(task = task_filename, error = %e, "move_to_done: lock acquisition failed");
                return false;
            }
        };

        let source = self.config.in_progress_dir().join(task_filename);
        let completing = self
            .config
            .in_progress_dir()
            .join(format!(".{task_filename}.completing"));

        if taskq_fs::atomic::safe_rename(&source, &completing).is_err() {
            drop(guard);
            return false;
        }

        let outcome = (|| -> Option<()> {
            let bytes = std::fs::read(&completing).ok()?;
            let mut record = TaskRecord::decode(&bytes).ok()?;
            record.mark_completed(success, results, error, self.clock.now());
            let bytes = record.encode().ok()?;
            let dest = self.config.done_dir().join(task_filename);
            taskq_fs::atomic::write(&dest, &bytes).ok()?;
            Some(())
        })();

        match outcome {
            Some(()) => {
                let _ = std::fs::remove_file(&completing);
                drop(guard);
                true
            }
            None => {
                let _ = taskq_fs::atomic::safe_rename(&completing, &source);
                drop(guard);
                false
            }
        }
    }

    /// Merge a progress update into `task`'s on-disk record (decoding
    /// fresh from disk, not a cached view). Returns `false` on any failure.
    pub fn report_progress(&self, task: &Task, percentage: Option<i32>, status: Option<&str>) -> bool {
        let task_filename = task.filename.as_str();
        let lock_name = format!("progress_{task_filename}");
        let guard = match self
            .lock
            .acquire(&lock_name, PROGRESS_LOCK_TIMEOUT, self.config.lock_retries)
        {
            Ok(guard) => guard,
            Err(e) => {
                warn!(task = task_filename, error = %e, "report_progress: lock acquisition failed");
                return false;
            }
        };

        let path = self.config.in_progress_dir().join(task_filename);
        let outcome = (|| -> Option<()> {
            let bytes = std::fs::read(&path).ok()?;
            let mut record = TaskRecord::decode(&bytes).ok()?;
            record.set_progress(percentage, status, self.clock.now());
            let bytes = record.encode().ok()?;
            taskq_fs::atomic::write(&path, &bytes).ok()
        })();

        drop(guard);
        outcome.is_some()
    }

    /// Flip the shutdown flag, stop the heartbeat (bounded join), and
    /// unlink this session's status files. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }

        let heartbeat_path = self
            .config
            .status_dir()
            .join(format!("{}.heartbeat", self.session_id));
        let _ = std::fs::remove_file(heartbeat_path);

        debug!(session_id = %self.session_id, "scheduler shut down");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Sort visible todo filenames by priority descending and decode the top
/// candidate. Ties are broken by randomizing among the top-k equal-priority
/// entries (spec leaves the tie-break unspecified; this is the recommended
/// choice, see the Open Question decision).
fn pick_highest_priority(dir: &std::path::Path, names: Vec<String>) -> Option<Task> {
    let mut decoded: Vec<Task> = names
        .into_iter()
        .filter_map(|name| {
            let bytes = std::fs::read(dir.join(&name)).ok()?;
            let record = TaskRecord::decode(&bytes).ok()?;
            Some(Task { filename: name, record })
        })
        .collect();

    if decoded.is_empty() {
        return None;
    }

    let top_priority = decoded.iter().map(|t| t.record.priority(0)).max()?;
    decoded.retain(|t| t.record.priority(0) == top_priority);

    use rand::Rng as _;
    let index = if decoded.len() == 1 {
        0
    } else {
        rand::rng().random_range(0..decoded.len())
    };
    decoded.into_iter().nth(index)
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
