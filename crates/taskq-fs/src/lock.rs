// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named advisory locks under `.locks/`, keyed by `(dir, name)`.
//!
//! Every cross-cutting state transition in the scheduler holds exactly one
//! of these for its duration; no component ever holds two at once.
//! Locks are advisory — correctness
//! depends on every participant honoring them — and are released
//! automatically by the OS if the holding process dies, which is how a
//! killed worker never leaves the queue permanently wedged.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use rand::Rng as _;
use taskq_core::TaskqError;
use tracing::debug;

/// How often to poll `try_lock_exclusive` while waiting out a single
/// attempt's `timeout` budget. `fs2` exposes no blocking-with-timeout
/// primitive, only a non-blocking try and an unboundedly-blocking lock.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cap on the exponential backoff between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Acquires named locks rooted at a `.locks/` directory.
#[derive(Debug, Clone)]
pub struct NamedLock {
    lock_dir: PathBuf,
}

impl NamedLock {
    /// `lock_dir` is typically `<base_dir>/.locks`; it is created on first
    /// use if missing.
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
        }
    }

    /// Acquire the named lock, retrying with exponential backoff on
    /// contention: `0.1 * 2^attempt * (1 + rand[0,1))` seconds, capped at
    /// 5s, up to `max_retries` attempts. Each attempt itself polls for up
    /// to `timeout` before being considered contended.
    pub fn acquire(
        &self,
        name: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<LockGuard, TaskqError> {
        std::fs::create_dir_all(&self.lock_dir)?;
        let path = self.lock_dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        for attempt in 0..max_retries.max(1) {
            if try_acquire_for(&file, timeout) {
                debug!(lock = name, attempt, "lock acquired");
                return Ok(LockGuard {
                    file: Some(file),
                    path,
                    released: false,
                });
            }

            if attempt + 1 < max_retries {
                let backoff = backoff_for(attempt);
                debug!(lock = name, attempt, backoff_ms = backoff.as_millis() as u64, "lock contended, backing off");
                thread::sleep(backoff);
            }
        }

        Err(TaskqError::LockAcquisition {
            name: name.to_string(),
            attempts: max_retries,
        })
    }
}

fn try_acquire_for(file: &File, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if file.try_lock_exclusive().is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn backoff_for(attempt: u32) -> Duration {
    let base = 0.1 * 2f64.powi(attempt as i32);
    let jitter = 1.0 + rand::rng().random_range(0.0..1.0);
    Duration::from_secs_f64((base * jitter).min(MAX_BACKOFF.as_secs_f64()))
}

/// A held lock. Dropping it releases the lock; [`LockGuard::release`] does
/// the same thing explicitly and is idempotent — releasing an
/// already-released guard is a no-op.
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    /// Release the lock now rather than waiting for drop. Safe to call
    /// more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        if let Some(file) = &self.file {
            let _ = FileExt::unlock(file);
        }
        self.released = true;
    }

    /// Path to the backing `.lock` file, for diagnostics.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
