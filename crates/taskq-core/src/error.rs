// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error vocabulary shared by `taskq-fs` and `taskq-engine`.
//!
//! Every public scheduler operation folds these into `None`/`false` at its
//! boundary — no error escapes a public operation as an uncaught
//! exception. `TaskqError` exists so the internal plumbing has a precise
//! vocabulary to log before it gets folded away.

use thiserror::Error;

/// Errors surfaced by the filesystem and locking primitives.
#[derive(Debug, Error)]
pub enum TaskqError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode task record: {0}")]
    Serde(#[from] serde_yaml::Error),

    #[error("failed to acquire lock {name:?} after {attempts} attempt(s)")]
    LockAcquisition { name: String, attempts: u32 },

    #[error("rename failed: {context}")]
    Rename { context: String },
}
