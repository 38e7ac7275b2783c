use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use taskq_core::{SessionId, SystemClock};
use tempfile::tempdir;

use super::*;

fn read_heartbeat(path: &std::path::Path) -> serde_yaml::Mapping {
    let bytes = std::fs::read(path).expect("heartbeat file should exist");
    match serde_yaml::from_slice::<Value>(&bytes).expect("heartbeat should decode") {
        Value::Mapping(m) => m,
        other => panic!("expected a mapping, got {other:?}"),
    }
}

#[test]
fn publishes_a_heartbeat_file_within_one_cycle() {
    let dir = tempdir().unwrap();
    let session_id = SessionId::generate();
    let mut publisher = HeartbeatPublisher::spawn(
        dir.path().to_path_buf(),
        session_id.clone(),
        42,
        "worker-1".to_string(),
        Duration::from_millis(20),
        Arc::new(SystemClock),
    );

    let path = dir.path().join(format!("{session_id}.heartbeat"));
    for _ in 0..50 {
        if path.exists() {
            break;
        }
        sleep(Duration::from_millis(10));
    }

    let fields = read_heartbeat(&path);
    assert_eq!(
        fields.get(Value::String("session_id".into())),
        Some(&Value::String(session_id.to_string()))
    );
    assert_eq!(
        fields.get(Value::String("process_id".into())),
        Some(&Value::from(42i64))
    );
    assert_eq!(
        fields.get(Value::String("hostname".into())),
        Some(&Value::String("worker-1".to_string()))
    );

    publisher.stop();
}

#[test]
fn stop_joins_within_the_bounded_timeout() {
    let dir = tempdir().unwrap();
    let mut publisher = HeartbeatPublisher::spawn(
        dir.path().to_path_buf(),
        SessionId::generate(),
        1,
        "worker-1".to_string(),
        Duration::from_millis(10),
        Arc::new(SystemClock),
    );

    sleep(Duration::from_millis(30));

    let started = std::time::Instant::now();
    publisher.stop();
    assert!(started.elapsed() < JOIN_TIMEOUT + Duration::from_secs(1));
}

#[test]
fn stop_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut publisher = HeartbeatPublisher::spawn(
        dir.path().to_path_buf(),
        SessionId::generate(),
        1,
        "worker-1".to_string(),
        Duration::from_millis(10),
        Arc::new(SystemClock),
    );

    publisher.stop();
    publisher.stop();
}

#[test]
fn last_beat_never_exceeds_now() {
    let dir = tempdir().unwrap();
    let session_id = SessionId::generate();
    let mut publisher = HeartbeatPublisher::spawn(
        dir.path().to_path_buf(),
        session_id.clone(),
        1,
        "worker-1".to_string(),
        Duration::from_millis(15),
        Arc::new(SystemClock),
    );

    sleep(Duration::from_millis(60));
    let before_stop = chrono::Utc::now();
    publisher.stop();

    let path = dir.path().join(format!("{session_id}.heartbeat"));
    let fields = read_heartbeat(&path);
    let last_beat = fields
        .get(Value::String("last_beat".into()))
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .unwrap();

    assert!(last_beat.with_timezone(&chrono::Utc) <= before_stop + chrono::Duration::seconds(1));
}
