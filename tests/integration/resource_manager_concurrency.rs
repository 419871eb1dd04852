//! Resource-manager level concurrency: the read/write gate, stats, and
//! the truncate-to-latest maintenance path.

use std::sync::Arc;
use std::thread;

use strata::{PageKind, RecordKind, ResourceConfig, ResourceManager};
use tempfile::tempdir;

#[test]
fn many_concurrent_readers_do_not_block_each_other() {
    let dir = tempdir().unwrap();
    let resource = Arc::new(ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap());
    {
        let mut write = resource.begin_write().unwrap();
        write.create_entry(PageKind::RecordPage, -1, RecordKind(1), b"shared".to_vec()).unwrap();
        write.commit().unwrap();
    }

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let resource = resource.clone();
            thread::spawn(move || {
                let read = resource.begin_read(None).unwrap();
                let record = read.record(0, PageKind::RecordPage, -1).unwrap().unwrap();
                assert_eq!(record.payload, b"shared");
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn read_permit_exhaustion_times_out() {
    let dir = tempdir().unwrap();
    let mut config = ResourceConfig::default_config(1);
    config.max_read_permits = 2;
    config.permit_timeout_ms = 30;
    let resource = ResourceManager::open(dir.path(), config).unwrap();

    let _r1 = resource.begin_read(None).unwrap();
    let _r2 = resource.begin_read(None).unwrap();
    assert!(resource.begin_read(None).is_err());
}

#[test]
fn reading_a_revision_past_the_newest_is_rejected() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
    assert!(resource.begin_read(Some(5)).is_err());
}

#[test]
fn stats_track_growth_across_commits() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
    let before = resource.stats().unwrap();

    for i in 0..10 {
        let mut write = resource.begin_write().unwrap();
        write.create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![i]).unwrap();
        write.commit().unwrap();
    }

    let after = resource.stats().unwrap();
    assert_eq!(after.newest_revision, before.newest_revision + 10);
    assert!(after.data_file_len > before.data_file_len);
}

#[test]
fn truncate_to_latest_does_not_break_reads() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();

    let mut keys = Vec::new();
    for i in 0..5 {
        let mut write = resource.begin_write().unwrap();
        keys.push(write.create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![i]).unwrap());
        write.commit().unwrap();
    }

    resource.truncate_to_latest().unwrap();

    let read = resource.begin_read(None).unwrap();
    for (i, &key) in keys.iter().enumerate() {
        assert_eq!(read.record(key, PageKind::RecordPage, -1).unwrap().unwrap().payload, vec![i as u8]);
    }
}

#[test]
fn closing_the_resource_rejects_new_transactions() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
    resource.close().unwrap();
    assert!(resource.begin_read(None).is_err());
    assert!(resource.begin_write().is_err());
}
