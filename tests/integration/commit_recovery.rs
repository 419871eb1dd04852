//! S6 (crash around the commit marker) and testable property 2 (commit
//! atomicity). We cannot literally kill the process mid-commit, so these
//! tests reproduce the recovery path directly: leave a stale commit
//! marker (and, in one case, stale spill files) the way an interrupted
//! `PageWriteTrx::commit` would, then reopen and check the resource comes
//! back in a single, consistent state.

use strata::{wal, PageKind, RecordKind, ResourceConfig, ResourceManager};
use tempfile::tempdir;

#[test]
fn reopen_with_a_leftover_marker_abandons_recovery_cleanly() {
    let dir = tempdir().unwrap();
    let key;
    {
        let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        let mut write = resource.begin_write().unwrap();
        key = write
            .create_entry(PageKind::RecordPage, -1, RecordKind(1), b"durable".to_vec())
            .unwrap();
        write.commit().unwrap();
    }

    // Simulate a crash that completed the durable uber-slot write but was
    // killed before the marker/spill cleanup step (spec's commit steps
    // 6-8): leave the marker and segment files behind.
    let log_dir = dir.path().join("log");
    wal::create_marker(&log_dir).unwrap();

    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
    assert!(!wal::marker_exists(&log_dir));

    let read = resource.begin_read(None).unwrap();
    let record = read.record(key, PageKind::RecordPage, -1).unwrap().unwrap();
    assert_eq!(record.payload, b"durable");
}

#[test]
fn property2_crash_never_exposes_an_intermediate_state() {
    let dir = tempdir().unwrap();
    let key;
    {
        let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        let mut write = resource.begin_write().unwrap();
        key = write
            .create_entry(PageKind::RecordPage, -1, RecordKind(1), b"committed".to_vec())
            .unwrap();
        write.commit().unwrap();
    }
    let revision_before_crash = {
        let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        resource.begin_read(None).unwrap().revision_number()
    };

    let log_dir = dir.path().join("log");
    wal::create_marker(&log_dir).unwrap();

    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
    let read = resource.begin_read(None).unwrap();
    // Either the previous revision or a fully-committed next one is
    // visible; the record from the last completed commit is never lost.
    assert!(read.revision_number() >= revision_before_crash);
    assert_eq!(
        read.record(key, PageKind::RecordPage, -1).unwrap().unwrap().payload,
        b"committed"
    );
}

#[test]
fn reopen_is_idempotent_with_no_marker() {
    let dir = tempdir().unwrap();
    {
        let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        let mut write = resource.begin_write().unwrap();
        write.create_entry(PageKind::RecordPage, -1, RecordKind(1), b"x".to_vec()).unwrap();
        write.commit().unwrap();
    }
    for _ in 0..3 {
        let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        assert_eq!(resource.begin_read(None).unwrap().revision_number(), 1);
    }
}
