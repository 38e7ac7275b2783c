// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process liveness probe.
//!
//! Cross-host liveness can never be verified directly — there is no way to
//! ask a remote kernel "is PID 4021 running" without a network collaborator
//! this crate doesn't have. Staleness for cross-host owners is inferred
//! from heartbeat absence instead (see [`crate::recovery`]).

use tracing::trace;

/// Is `pid` alive on `host`? `local_host` is the caller's own hostname.
///
/// Returns `false` conservatively whenever `host` is set and differs from
/// `local_host`: a remote liveness probe cannot be performed, and treating
/// "unknown" as "dead" is the safe direction (recovery will fall back to
/// the heartbeat staleness window for the real answer).
pub fn alive(pid: i64, host: Option<&str>, local_host: &str) -> bool {
    if let Some(host) = host {
        if !host.eq_ignore_ascii_case(local_host) {
            trace!(pid, host, local_host, "cross-host probe, assuming dead");
            return false;
        }
    }

    if pid <= 0 {
        return false;
    }

    probe_local(pid)
}

#[cfg(unix)]
fn probe_local(pid: i64) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };

    // /proc is the cheap path on Linux; fall through to a zero-signal send
    // for correctness on other Unixes (and as a fallback if /proc isn't
    // mounted, e.g. inside some containers).
    #[cfg(target_os = "linux")]
    {
        if std::path::Path::new(&format!("/proc/{pid}")).exists() {
            return true;
        }
    }

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        // Process exists but is owned by someone else: still alive.
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn probe_local(_pid: i64) -> bool {
    false
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
