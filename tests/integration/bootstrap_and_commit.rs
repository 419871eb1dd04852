//! End-to-end scenarios S1-S4: bootstrap, write-commit-read, tombstone,
//! and rollback.

use strata::{PageKind, RecordKind, ResourceConfig, ResourceManager};
use tempfile::tempdir;

#[test]
fn s1_bootstrap_read_empty() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
    let read = resource.begin_read(Some(0)).unwrap();
    assert!(read.record(0, PageKind::RecordPage, -1).unwrap().is_none());
}

#[test]
fn s2_write_commit_read() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();

    let old_read = resource.begin_read(None).unwrap();

    let key;
    {
        let mut write = resource.begin_write().unwrap();
        key = write
            .create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![0x41])
            .unwrap();
        write.commit().unwrap();
    }

    let new_read = resource.begin_read(None).unwrap();
    let record = new_read.record(key, PageKind::RecordPage, -1).unwrap().unwrap();
    assert_eq!(record.payload, vec![0x41]);
    assert!(old_read.record(key, PageKind::RecordPage, -1).unwrap().is_none());
}

#[test]
fn s3_tombstone() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();

    let key;
    {
        let mut write = resource.begin_write().unwrap();
        key = write
            .create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![0x41])
            .unwrap();
        write.commit().unwrap();
    }
    let s2_read = resource.begin_read(None).unwrap();

    {
        let mut write = resource.begin_write().unwrap();
        write.remove_entry(key, PageKind::RecordPage, -1).unwrap();
        write.commit().unwrap();
    }

    let newest = resource.begin_read(None).unwrap();
    assert!(newest.record(key, PageKind::RecordPage, -1).unwrap().is_none());
    assert!(s2_read.record(key, PageKind::RecordPage, -1).unwrap().is_some());
}

#[test]
fn s4_rollback_produces_no_new_revision() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();

    {
        let mut write = resource.begin_write().unwrap();
        write.create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![1]).unwrap();
        write.commit().unwrap();
    }
    let revision_after_s2 = resource.begin_read(None).unwrap().revision_number();

    {
        let mut write = resource.begin_write().unwrap();
        for _ in 2..10 {
            write.create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![9]).unwrap();
        }
        write.rollback().unwrap();
    }

    let read = resource.begin_read(None).unwrap();
    assert_eq!(read.revision_number(), revision_after_s2);
}
