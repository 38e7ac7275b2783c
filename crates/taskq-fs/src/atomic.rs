// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic publish and safe rename.
//!
//! These two functions are the only way any other module in this workspace
//! is allowed to touch the visible filesystem namespace: every write that
//! must be observed as "fully there or not there at all" goes through
//! [`write`], and every state-machine transition goes through
//! [`safe_rename`].

use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;

use taskq_core::TaskqError;

/// Write `bytes` to `path` atomically: write to `path.tmp`, `fsync`, then
/// rename into place. A crash at any point before the rename leaves `path`
/// untouched; a crash after leaves it fully populated with `bytes`.
///
/// On failure the `.tmp` file is best-effort removed so it doesn't linger
/// as a fake "in-flight" marker.
pub fn write(path: &Path, bytes: &[u8]) -> Result<(), TaskqError> {
    let tmp_path = tmp_path_for(path);

    let result = (|| -> Result<(), TaskqError> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        safe_rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    std::path::PathBuf::from(os)
}

/// Rename `src` to `dst`. Falls back to copy-then-unlink when the plain
/// rename fails (e.g. a cross-device rename on a bind-mounted queue
/// directory). Never panics: a failure here means "`dst` may or may not
/// exist; `src` may or may not still exist" and callers in the recovery
/// and scheduler paths are written to tolerate that ambiguity rather than
/// treat it as fatal.
pub fn safe_rename(src: &Path, dst: &Path) -> Result<(), TaskqError> {
    if let Ok(()) = fs::rename(src, dst) {
        return Ok(());
    }

    // Cross-device or other rename failure: copy then unlink as a
    // best-effort fallback.
    match fs::copy(src, dst) {
        Ok(_) => {
            let _ = fs::remove_file(src);
            Ok(())
        }
        Err(e) => Err(TaskqError::Rename {
            context: format!("{} -> {}: {e}", src.display(), dst.display()),
        }),
    }
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
