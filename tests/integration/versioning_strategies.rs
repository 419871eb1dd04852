//! Versioning correctness across all four reconstruction strategies.

use strata::{PageKind, RecordKind, ResourceConfig, RevisioningClass, ResourceManager};
use tempfile::tempdir;

fn config_with(class: RevisioningClass, restore: u32) -> ResourceConfig {
    let mut config = ResourceConfig::default_config(1);
    config.revisioning_class = class;
    config.numbers_of_revision_to_restore = restore;
    config
}

#[test]
fn sliding_snapshot_hides_fragments_older_than_the_restore_window() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), config_with(RevisioningClass::SlidingSnapshot, 3)).unwrap();

    // A distinct key per revision, all addressing the same page_key
    // (every key here is well under PAGE_FANOUT, so they all land in
    // page_key 0). A sliding-snapshot read bounded to the three most
    // recent fragments must only ever see the keys introduced by those
    // fragments; keys from older revisions must be invisible even though
    // they were never deleted.
    let mut keys = Vec::new();
    for revision in 1..=7u32 {
        let mut write = resource.begin_write().unwrap();
        let key = write
            .create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![revision as u8])
            .unwrap();
        write.commit().unwrap();
        keys.push(key);
    }

    let read = resource.begin_read(Some(7)).unwrap();
    for (i, &key) in keys.iter().enumerate() {
        let revision = i as u32 + 1;
        let record = read.record(key, PageKind::RecordPage, -1).unwrap();
        if revision <= 4 {
            assert!(
                record.is_none(),
                "key from revision {revision} should be invisible beyond the 3 most recent fragments"
            );
        } else {
            assert_eq!(
                record.unwrap().payload,
                vec![revision as u8],
                "key from revision {revision} should be visible"
            );
        }
    }
}

#[test]
fn full_strategy_always_reconstructs_the_nearest_fragment() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), config_with(RevisioningClass::Full, 1)).unwrap();

    let key;
    {
        let mut write = resource.begin_write().unwrap();
        key = write.create_entry(PageKind::RecordPage, -1, RecordKind(1), b"a".to_vec()).unwrap();
        write.commit().unwrap();
    }
    {
        let mut write = resource.begin_write().unwrap();
        write.put_record(key, PageKind::RecordPage, -1, RecordKind(1), b"b".to_vec()).unwrap();
        write.commit().unwrap();
    }

    let read = resource.begin_read(None).unwrap();
    assert_eq!(read.record(key, PageKind::RecordPage, -1).unwrap().unwrap().payload, b"b");
}

#[test]
fn incremental_strategy_overlays_every_write_since_the_last_full_fragment() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), config_with(RevisioningClass::Incremental, 1)).unwrap();

    let mut keys = Vec::new();
    {
        let mut write = resource.begin_write().unwrap();
        for i in 0..5 {
            keys.push(write.create_entry(PageKind::RecordPage, -1, RecordKind(1), vec![i]).unwrap());
        }
        write.commit().unwrap();
    }
    {
        let mut write = resource.begin_write().unwrap();
        write.put_record(keys[2], PageKind::RecordPage, -1, RecordKind(1), vec![99]).unwrap();
        write.commit().unwrap();
    }

    let read = resource.begin_read(None).unwrap();
    for (i, &key) in keys.iter().enumerate() {
        let payload = read.record(key, PageKind::RecordPage, -1).unwrap().unwrap().payload;
        if i == 2 {
            assert_eq!(payload, vec![99]);
        } else {
            assert_eq!(payload, vec![i as u8]);
        }
    }
}

#[test]
fn differential_strategy_keeps_at_most_two_fragments() {
    let dir = tempdir().unwrap();
    let resource = ResourceManager::open(dir.path(), config_with(RevisioningClass::Differential, 1)).unwrap();

    let key;
    {
        let mut write = resource.begin_write().unwrap();
        key = write.create_entry(PageKind::RecordPage, -1, RecordKind(1), b"v1".to_vec()).unwrap();
        write.commit().unwrap();
    }
    for v in 2..=4 {
        let mut write = resource.begin_write().unwrap();
        write.put_record(key, PageKind::RecordPage, -1, RecordKind(1), format!("v{v}").into_bytes()).unwrap();
        write.commit().unwrap();
    }

    let read = resource.begin_read(None).unwrap();
    assert_eq!(read.record(key, PageKind::RecordPage, -1).unwrap().unwrap().payload, b"v4");
}

#[test]
fn tombstones_survive_reconstruction_under_every_strategy() {
    for class in [
        RevisioningClass::Full,
        RevisioningClass::Incremental,
        RevisioningClass::Differential,
        RevisioningClass::SlidingSnapshot,
    ] {
        let dir = tempdir().unwrap();
        let resource = ResourceManager::open(dir.path(), config_with(class, 2)).unwrap();

        let key;
        {
            let mut write = resource.begin_write().unwrap();
            key = write.create_entry(PageKind::RecordPage, -1, RecordKind(1), b"alive".to_vec()).unwrap();
            write.commit().unwrap();
        }
        {
            let mut write = resource.begin_write().unwrap();
            write.remove_entry(key, PageKind::RecordPage, -1).unwrap();
            write.commit().unwrap();
        }

        let read = resource.begin_read(None).unwrap();
        assert!(
            read.record(key, PageKind::RecordPage, -1).unwrap().is_none(),
            "{class:?} failed to honor a tombstone"
        );
    }
}
