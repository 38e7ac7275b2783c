// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! taskq-fs: the filesystem primitives and lock discipline the queue state
//! machine is built on. Every atomicity guarantee the scheduler relies on
//! is implemented exactly once, here.

pub mod atomic;
pub mod listing;
pub mod lock;

pub use lock::{LockGuard, NamedLock};
