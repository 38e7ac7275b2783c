// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Termination-signal handling.
//!
//! The signal-to-shutdown mapping is process-global: only one scheduler
//! per process may call [`install`]. Other schedulers sharing the process
//! should observe the flag this one sets via [`crate::scheduler::Scheduler::shutdown_flag`]
//! instead of installing their own handlers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

/// Spawn a background thread that blocks on SIGTERM/SIGINT. On receipt: set
/// `shutdown` so in-flight callers fast-fail, best-effort unlink
/// `heartbeat_path`, and exit the process with the `128 + signum`
/// convention.
pub fn install(shutdown: Arc<AtomicBool>, heartbeat_path: PathBuf) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGINT])?;

    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "received termination signal, shutting down");
            shutdown.store(true, Ordering::SeqCst);
            let _ = std::fs::remove_file(&heartbeat_path);
            std::process::exit(128 + signal);
        }
    });

    Ok(())
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
