use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::tempdir;

use super::*;

#[test]
fn acquire_then_release_allows_reacquire() {
    let dir = tempdir().unwrap();
    let lock = NamedLock::new(dir.path().join(".locks"));

    let mut guard = lock.acquire("stale_check", Duration::from_millis(200), 3).unwrap();
    guard.release();

    let _guard2 = lock.acquire("stale_check", Duration::from_millis(200), 3).unwrap();
}

#[test]
fn drop_releases_the_lock() {
    let dir = tempdir().unwrap();
    let lock = NamedLock::new(dir.path().join(".locks"));

    {
        let _guard = lock.acquire("claim", Duration::from_millis(200), 3).unwrap();
    }

    let _guard2 = lock.acquire("claim", Duration::from_millis(200), 3).unwrap();
}

#[test]
fn release_is_idempotent() {
    let dir = tempdir().unwrap();
    let lock = NamedLock::new(dir.path().join(".locks"));

    let mut guard = lock.acquire("claim", Duration::from_millis(200), 3).unwrap();
    guard.release();
    guard.release();
}

#[test]
fn second_acquirer_times_out_while_first_holds_lock() {
    let dir = tempdir().unwrap();
    let lock = NamedLock::new(dir.path().join(".locks"));

    let _holder = lock.acquire("claim", Duration::from_millis(200), 3).unwrap();

    let result = lock.acquire("claim", Duration::from_millis(50), 2);

    assert!(result.is_err());
}

#[test]
fn only_one_thread_observes_the_lock_held_at_a_time() {
    let dir = tempdir().unwrap();
    let lock_dir = dir.path().join(".locks");
    let overlap_count = Arc::new(AtomicUsize::new(0));
    let concurrent = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lock = NamedLock::new(lock_dir.clone());
            let overlap_count = Arc::clone(&overlap_count);
            let concurrent = Arc::clone(&concurrent);
            thread::spawn(move || {
                let _guard = lock.acquire("claim", Duration::from_secs(2), 50).unwrap();
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                if now > 1 {
                    overlap_count.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(5));
                concurrent.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(overlap_count.load(Ordering::SeqCst), 0);
}
