// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background heartbeat publisher.
//!
//! Realized as a plain OS thread bound to the scheduler's lifetime rather
//! than an async task: the rest of this crate is synchronous, and a thread
//! with a bounded join gives the same "stop within one cycle" guarantee
//! without pulling in an async runtime for one periodic write.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_yaml::Value;
use taskq_core::{Clock, SessionId};
use tracing::warn;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Static identity copied into the background thread at construction; the
/// publisher never reaches back into the scheduler's mutable state.
#[derive(Debug, Clone)]
struct Identity {
    session_id: SessionId,
    process_id: i64,
    hostname: String,
}

/// Publishes `.status/<session_id>.heartbeat` on a fixed interval until
/// told to stop.
pub struct HeartbeatPublisher {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatPublisher {
    /// Spawn the publisher. `status_dir` is the `.status/` directory;
    /// it must already exist.
    pub fn spawn(
        status_dir: PathBuf,
        session_id: SessionId,
        process_id: i64,
        hostname: String,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let identity = Identity {
            session_id,
            process_id,
            hostname,
        };
        let start = clock.now();

        let thread_shutdown = Arc::clone(&shutdown);
        let handle = thread::spawn(move || {
            run(status_dir, identity, start, interval, clock, thread_shutdown)
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal the publisher to stop and wait up to 5s for it to join.
    /// Idempotent: calling this more than once, or after the thread has
    /// already exited, is harmless.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };

        let deadline = Instant::now() + JOIN_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL_INTERVAL);
        }
        let _ = handle.join();
    }
}

impl Drop for HeartbeatPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    status_dir: PathBuf,
    identity: Identity,
    start: chrono::DateTime<chrono::Utc>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    shutdown: Arc<AtomicBool>,
) {
    let path = status_dir.join(format!("{}.heartbeat", identity.session_id));

    while !shutdown.load(Ordering::SeqCst) {
        if let Err(e) = publish_once(&path, &identity, start, clock.as_ref()) {
            warn!(error = %e, "heartbeat publish failed, will retry next tick");
        }
        sleep_respecting_shutdown(interval, &shutdown);
    }
}

fn sleep_respecting_shutdown(interval: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while Instant::now() < deadline {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        thread::sleep(JOIN_POLL_INTERVAL.min(interval));
    }
}

fn publish_once(
    path: &std::path::Path,
    identity: &Identity,
    start: chrono::DateTime<chrono::Utc>,
    clock: &dyn Clock,
) -> Result<(), taskq_core::TaskqError> {
    let now = clock.now();
    let uptime = (now - start).num_milliseconds().max(0) as f64 / 1000.0;

    let mut fields = serde_yaml::Mapping::new();
    fields.insert(
        Value::String("session_id".into()),
        Value::String(identity.session_id.to_string()),
    );
    fields.insert(
        Value::String("process_id".into()),
        Value::from(identity.process_id),
    );
    fields.insert(
        Value::String("hostname".into()),
        Value::String(identity.hostname.clone()),
    );
    fields.insert(
        Value::String("last_beat".into()),
        Value::String(now.to_rfc3339()),
    );
    fields.insert(Value::String("uptime_seconds".into()), Value::from(uptime));

    let bytes = serde_yaml::to_string(&Value::Mapping(fields))?.into_bytes();
    taskq_fs::atomic::write(path, &bytes)
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
