//! Testable properties 1 (snapshot isolation), 7 (single-writer), and 8
//! (monotonic keys).

use std::sync::Arc;
use std::thread;

use strata::{PageKind, RecordKind, ResourceConfig, ResourceManager};
use tempfile::tempdir;

#[test]
fn property1_snapshot_outlives_later_commits() {
    let dir = tempdir().unwrap();
    let resource = Arc::new(ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap());

    let key;
    {
        let mut write = resource.begin_write().unwrap();
        key = write
            .create_entry(PageKind::RecordPage, -1, RecordKind(1), b"v0".to_vec())
            .unwrap();
        write.commit().unwrap();
    }

    let readers: Vec<_> = (0..8)
        .map(|_| resource.begin_read(None).unwrap())
        .collect();

    for revision in 1..=5u32 {
        let mut write = resource.begin_write().unwrap();
        write.put_record(key, PageKind::RecordPage, -1, RecordKind(1), format!("v{revision}").into_bytes()).unwrap();
        write.commit().unwrap();
    }

    for reader in &readers {
        let payload = reader.record(key, PageKind::RecordPage, -1).unwrap().unwrap().payload;
        assert_eq!(payload, b"v0");
    }

    let latest = resource.begin_read(None).unwrap();
    assert_eq!(latest.record(key, PageKind::RecordPage, -1).unwrap().unwrap().payload, b"v5");
}

#[test]
fn property1_concurrent_readers_each_see_their_own_pinned_revision() {
    let dir = tempdir().unwrap();
    let resource = Arc::new(ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap());

    let key;
    {
        let mut write = resource.begin_write().unwrap();
        key = write
            .create_entry(PageKind::RecordPage, -1, RecordKind(1), b"r1".to_vec())
            .unwrap();
        write.commit().unwrap();
    }
    let pinned_at_1 = resource.begin_read(Some(1)).unwrap();

    {
        let mut write = resource.begin_write().unwrap();
        write.put_record(key, PageKind::RecordPage, -1, RecordKind(1), b"r2".to_vec()).unwrap();
        write.commit().unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let resource = resource.clone();
            thread::spawn(move || {
                let read = resource.begin_read(None).unwrap();
                read.record(key, PageKind::RecordPage, -1).unwrap().unwrap().payload
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), b"r2");
    }

    assert_eq!(pinned_at_1.record(key, PageKind::RecordPage, -1).unwrap().unwrap().payload, b"r1");
}

#[test]
fn property7_second_writer_rejected_while_one_is_live() {
    let dir = tempdir().unwrap();
    let mut config = ResourceConfig::default_config(1);
    config.permit_timeout_ms = 50;
    let resource = ResourceManager::open(dir.path(), config).unwrap();

    let _writer = resource.begin_write().unwrap();
    let second = resource.begin_write();
    assert!(second.is_err());
}

#[test]
fn property7_writer_permit_released_on_close_allows_next_writer() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();

    let mut first = resource.begin_write().unwrap();
    first.close().unwrap();

    let second = resource.begin_write();
    assert!(second.is_ok());
}

#[test]
fn property8_monotonic_keys_within_one_transaction() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();

    let mut write = resource.begin_write().unwrap();
    let keys: Vec<i64> = (0..16)
        .map(|_| write.create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![0]).unwrap())
        .collect();

    for pair in keys.windows(2) {
        assert_eq!(pair[1], pair[0] + 1);
    }
    assert_eq!(keys[0], 0);
}

#[test]
fn property8_monotonic_keys_persist_across_transactions() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();

    let mut first_keys = Vec::new();
    {
        let mut write = resource.begin_write().unwrap();
        for _ in 0..4 {
            first_keys.push(write.create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![0]).unwrap());
        }
        write.commit().unwrap();
    }

    let mut write = resource.begin_write().unwrap();
    let next = write.create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![1]).unwrap();
    assert_eq!(next, *first_keys.last().unwrap() + 1);
}
