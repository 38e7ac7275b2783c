use super::*;

#[test]
fn defaults_match_the_documented_table() {
    let config = SchedulerConfig::default();

    assert_eq!(config.base_dir, PathBuf::from("."));
    assert_eq!(config.timeout_minutes, 15);
    assert_eq!(config.heartbeat_interval_secs, 30);
    assert_eq!(config.orphan_age_seconds, 3600);
    assert_eq!(config.lock_timeout_secs, 10);
    assert_eq!(config.lock_retries, 5);
}

#[test]
fn directory_helpers_are_rooted_at_base_dir() {
    let config = SchedulerConfig {
        base_dir: PathBuf::from("/queue"),
        ..SchedulerConfig::default()
    };

    assert_eq!(config.todo_dir(), PathBuf::from("/queue/todo"));
    assert_eq!(config.in_progress_dir(), PathBuf::from("/queue/in_progress"));
    assert_eq!(config.done_dir(), PathBuf::from("/queue/done"));
    assert_eq!(config.corrupted_dir(), PathBuf::from("/queue/corrupted"));
    assert_eq!(config.status_dir(), PathBuf::from("/queue/.status"));
    assert_eq!(config.locks_dir(), PathBuf::from("/queue/.locks"));
}

#[test]
fn all_dirs_lists_exactly_the_six_subdirectories() {
    let config = SchedulerConfig::default();
    assert_eq!(config.all_dirs().len(), 6);
}
