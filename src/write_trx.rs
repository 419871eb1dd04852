//! Page write transaction: the single exclusive writer for a resource,
//! copy-on-write staging through a [`Wal`], and the commit protocol that
//! publishes a new revision.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, StorageError};
use crate::io;
use crate::page::{
    path_for, IndirectPage, Page, PageKind, PageReference, Record, RecordKind, RecordPage,
    RevisionRootPage, UberPage, PAGE_EXP_BITS, PAGE_FANOUT,
};
use crate::read_trx::PageReadTrx;
use crate::resource::{subtree_ref, Inner, PageStore, WritePermit};
use crate::wal::{self, Wal, WalEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrxState {
    Fresh,
    Dirty,
    Committed,
    Closed,
}

/// Identifies one subtree instance a transaction may stage writes
/// against: which kind, which sibling index (ignored for `RecordPage`),
/// and which page_key within it.
type StageKey = (PageKind, i32, u64);

/// The resource's single writer. Reads fall through to
/// `base` for anything this transaction has not itself modified;
/// `new_revision_root` accumulates the copy-on-write result that commit
/// eventually publishes.
pub struct PageWriteTrx {
    inner: Arc<Inner>,
    base: PageReadTrx,
    new_revision_root: RevisionRootPage,
    new_revision: u32,
    wal: Wal,
    staged: HashMap<StageKey, u64>,
    permit: Option<WritePermit>,
    state: TrxState,
    txn_id: u64,
}

impl PageWriteTrx {
    pub(crate) fn new(inner: Arc<Inner>, base: PageReadTrx, permit: WritePermit, txn_id: u64) -> Self {
        let new_revision = base.revision_number() + 1;
        let new_revision_root = RevisionRootPage {
            revision: new_revision,
            ..base.revision_root().clone()
        };
        Self {
            inner,
            base,
            new_revision_root,
            new_revision,
            wal: Wal::new(),
            staged: HashMap::new(),
            permit: Some(permit),
            state: TrxState::Fresh,
            txn_id,
        }
    }

    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Frames staged, bytes spilled, and spill syncs for this
    /// transaction's WAL so far.
    pub fn wal_stats(&self) -> wal::WalStats {
        self.wal.stats()
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            TrxState::Closed | TrxState::Committed => {
                Err(StorageError::usage("write transaction is no longer open"))
            }
            _ => self.inner.check_open(),
        }
    }

    /// Installs a new record, assigning it the next key in this
    /// subtree's monotonic sequence. Returns the assigned key.
    pub fn create_entry(&mut self, page_kind: PageKind, index: i32, kind: RecordKind, payload: Vec<u8>) -> Result<i64> {
        self.check_open()?;
        let key = self
            .next_key_for(page_kind, index)
            .checked_add(1)
            .ok_or_else(|| StorageError::usage("record key counter overflowed"))?;
        let page_key = (key as u64) >> PAGE_EXP_BITS;
        let log_key = self.prepare_for_modification(page_kind, index, page_key)?;
        match self.wal.get_mut(log_key) {
            Some(WalEntry::RecordContainer { modified, .. }) => {
                modified.put(Record { key, kind, payload });
            }
            _ => return Err(StorageError::corrupt("staged slot is not a record container")),
        }
        self.bump_max_key(page_kind, index, key);
        self.state = TrxState::Dirty;
        Ok(key)
    }

    /// The current high-water-mark key for `(page_kind, index)`, before
    /// the `+ 1` bump `create_entry` applies. Starts at `NULL_KEY` (`-1`)
    /// so the first assigned key in a fresh subtree is `0`.
    fn next_key_for(&self, page_kind: PageKind, index: i32) -> i64 {
        match page_kind {
            PageKind::RecordPage => self.new_revision_root.max_node_key,
            PageKind::PathSummaryPage | PageKind::CasPage | PageKind::PathPage => {
                let idx = index.max(0) as usize;
                self.new_revision_root
                    .aux_tree(page_kind, idx)
                    .map(|a| a.max_record_key)
                    .unwrap_or(crate::page::NULL_KEY)
            }
            _ => crate::page::NULL_KEY,
        }
    }

    /// Overwrites the record at an already-known `key` (the external node
    /// layer's update path: `prepare_for_modification` followed by a
    /// direct mutation of the returned record). Unlike
    /// [`create_entry`](Self::create_entry) this never advances the
    /// subtree's key counter.
    pub fn put_record(&mut self, key: i64, page_kind: PageKind, index: i32, kind: RecordKind, payload: Vec<u8>) -> Result<()> {
        self.check_open()?;
        if key < 0 {
            return Err(StorageError::usage("record key must be non-negative"));
        }
        let page_key = (key as u64) >> PAGE_EXP_BITS;
        let log_key = self.prepare_for_modification(page_kind, index, page_key)?;
        match self.wal.get_mut(log_key) {
            Some(WalEntry::RecordContainer { modified, .. }) => {
                modified.put(Record { key, kind, payload });
            }
            _ => return Err(StorageError::corrupt("staged slot is not a record container")),
        }
        self.state = TrxState::Dirty;
        Ok(())
    }

    /// Marks `key` as a tombstone; the slot is kept, not physically
    /// deleted, so older revisions still see it.
    pub fn remove_entry(&mut self, key: i64, page_kind: PageKind, index: i32) -> Result<()> {
        self.check_open()?;
        if key < 0 {
            return Err(StorageError::usage("record key must be non-negative"));
        }
        let page_key = (key as u64) >> PAGE_EXP_BITS;
        let log_key = self.prepare_for_modification(page_kind, index, page_key)?;
        match self.wal.get_mut(log_key) {
            Some(WalEntry::RecordContainer { modified, .. }) => modified.mark_deleted(key),
            _ => return Err(StorageError::corrupt("staged slot is not a record container")),
        }
        self.state = TrxState::Dirty;
        Ok(())
    }

    /// Reads `key`, seeing this transaction's own uncommitted writes
    /// ahead of the base revision: a write transaction reads through its
    /// own staged pages first, overlaid on the merged view its base
    /// revision reads saw before any of this transaction's writes.
    pub fn get_record(&self, key: i64, page_kind: PageKind, index: i32) -> Result<Option<Record>> {
        if key < 0 {
            return Err(StorageError::usage("record key must be non-negative"));
        }
        let page_key = (key as u64) >> PAGE_EXP_BITS;
        if let Some(&log_key) = self.staged.get(&(page_kind, index, page_key)) {
            if let Some(WalEntry::RecordContainer { complete, modified }) = self.wal.get(log_key) {
                return Ok(match modified.get(key) {
                    Some(r) => (!r.kind.is_deleted()).then(|| r.clone()),
                    None => match complete.get(key) {
                        Some(r) if !r.kind.is_deleted() => Some(r.clone()),
                        _ => None,
                    },
                });
            }
        }
        self.base.record(key, page_kind, index)
    }

    pub fn revision_number(&self) -> u32 {
        self.new_revision
    }

    /// Ensures `page_key` within `(page_kind, index)`'s subtree has a
    /// writable fragment staged in the WAL, cloning the copy-on-write path
    /// down to it. The fragment pairs the merged `complete` view (for
    /// reads within this transaction) with a fresh, empty `modified` page
    /// that only this revision's own writes land in — keeping the
    /// persisted fragment a delta rather than a full merged snapshot.
    /// Returns the fragment's `log_key`, reusing it if this transaction
    /// already touched the page.
    fn prepare_for_modification(&mut self, page_kind: PageKind, index: i32, page_key: u64) -> Result<u64> {
        let cache_key = (page_kind, index, page_key);
        if let Some(&log_key) = self.staged.get(&cache_key) {
            return Ok(log_key);
        }
        let levels = self.base.uber().shape.levels_for(page_kind);
        let (root_ref, _) = subtree_ref(&self.new_revision_root, self.base.uber(), page_kind, index)
            .ok_or_else(|| StorageError::usage(format!("no such subtree: {page_kind:?}[{index}]")))?;

        let complete = self.base.reconstruct_page(page_kind, index, page_key)?;
        let modified = RecordPage::new(page_kind, self.new_revision, page_key);

        let log_key = self.wal.alloc_log_key();
        self.wal.insert(log_key, WalEntry::RecordContainer { complete, modified });
        let leaf_ref = PageReference::to_log(page_kind, log_key);

        let path = path_for(page_key, levels);
        let new_root = prepare_leaf(&self.base.store, &mut self.wal, &root_ref, self.new_revision, &path, &leaf_ref)?;
        self.set_subtree_root(page_kind, index, new_root)?;
        self.staged.insert(cache_key, log_key);
        Ok(log_key)
    }

    fn set_subtree_root(&mut self, page_kind: PageKind, index: i32, new_root: PageReference) -> Result<()> {
        match page_kind {
            PageKind::RecordPage => {
                self.new_revision_root.main_tree = new_root;
                Ok(())
            }
            PageKind::PathSummaryPage | PageKind::CasPage | PageKind::PathPage => {
                let idx = index.max(0) as usize;
                let aux = self
                    .new_revision_root
                    .aux_tree_mut(page_kind, idx)
                    .ok_or_else(|| StorageError::usage("no such auxiliary subtree"))?;
                aux.root = new_root;
                Ok(())
            }
            other => Err(StorageError::usage(format!("{other:?} is not record-bearing"))),
        }
    }

    fn bump_max_key(&mut self, page_kind: PageKind, index: i32, key: i64) {
        match page_kind {
            PageKind::RecordPage => {
                if key > self.new_revision_root.max_node_key {
                    self.new_revision_root.max_node_key = key;
                }
            }
            _ => {
                let idx = index.max(0) as usize;
                if let Some(aux) = self.new_revision_root.aux_tree_mut(page_kind, idx) {
                    if key > aux.max_record_key {
                        aux.max_record_key = key;
                    }
                }
            }
        }
    }

    /// Publishes the new revision: commit marker, WAL spill, depth-first
    /// materialization of every staged page onto disk, then the atomic
    /// uber-page reference swap.
    pub fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        let _commit_guard = self.inner.commit_lock.lock();
        let log_dir = self.inner.log_dir();
        wal::create_marker(&log_dir)?;
        wal::spill(&log_dir, &mut self.wal)?;

        let store = self.inner.store.clone();
        let mut persisted: HashMap<u64, u64> = HashMap::new();

        self.new_revision_root.main_tree =
            materialize(&store, &self.wal, &mut persisted, &self.new_revision_root.main_tree)?;
        self.new_revision_root.name_page =
            materialize(&store, &self.wal, &mut persisted, &self.new_revision_root.name_page)?;
        for aux in &mut self.new_revision_root.aux_trees {
            aux.root = materialize(&store, &self.wal, &mut persisted, &aux.root)?;
        }

        let revision_root_key = store.append(&Page::RevisionRoot(self.new_revision_root.clone()))?;
        let leaf_ref = PageReference::to_disk(PageKind::RevisionRoot, revision_root_key);

        let base_uber = self.base.uber().clone();
        let path = path_for(self.new_revision as u64, base_uber.shape.revision_tree_levels);
        let staged_tree_root = prepare_leaf(
            &store,
            &mut self.wal,
            &base_uber.revision_tree_root,
            self.new_revision,
            &path,
            &leaf_ref,
        )?;
        let final_tree_root = materialize(&store, &self.wal, &mut persisted, &staged_tree_root)?;

        let new_uber = UberPage {
            revision: self.new_revision,
            newest_revision: self.new_revision,
            revision_tree_root: final_tree_root,
            shape: base_uber.shape.clone(),
        };
        let uber_key = store.append(&Page::Uber(new_uber.clone()))?;
        store.io.sync_all()?;
        io::write_uber_page_reference(&*store.io, uber_key)?;

        self.inner.install_committed_uber(new_uber);

        wal::clear_spill(&log_dir)?;
        wal::delete_marker(&log_dir)?;

        self.wal.clear();
        self.staged.clear();
        self.state = TrxState::Committed;
        self.permit = None;
        Ok(())
    }

    /// Discards every staged change, reverting to the base revision:
    /// discards the WAL and clears the log-key counter.
    pub fn rollback(&mut self) -> Result<()> {
        self.check_open()?;
        self.wal.clear();
        self.staged.clear();
        self.new_revision_root = RevisionRootPage {
            revision: self.new_revision,
            ..self.base.revision_root().clone()
        };
        self.state = TrxState::Fresh;
        Ok(())
    }

    /// Rolls back if uncommitted, then releases the write permit.
    /// Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.state == TrxState::Dirty {
            self.rollback()?;
        }
        self.permit = None;
        self.state = TrxState::Closed;
        Ok(())
    }
}

/// Loads an indirect page either from the WAL (if already staged this
/// transaction) or from disk.
fn load_indirect(store: &PageStore, wal: &Wal, reference: &PageReference) -> Result<IndirectPage> {
    if let Some(log_key) = reference.log_key {
        match wal.get(log_key) {
            Some(WalEntry::Page(Page::Indirect(p))) => Ok(p.clone()),
            _ => Err(StorageError::corrupt("log_key does not reference an indirect page")),
        }
    } else {
        match &*store.load(reference)? {
            Page::Indirect(p) => Ok(p.clone()),
            _ => Err(StorageError::corrupt("reference is not an indirect page")),
        }
    }
}

/// Clones the copy-on-write path from `root` down to the slot named by
/// `path`, setting its terminal child to `leaf_ref` and staging every
/// cloned `IndirectPage` level in the WAL. Only the path from root to
/// the modified leaf is ever cloned, once per transaction.
fn prepare_leaf(
    store: &PageStore,
    wal: &mut Wal,
    root: &PageReference,
    revision: u32,
    path: &[usize],
    leaf_ref: &PageReference,
) -> Result<PageReference> {
    let idx = path[0];
    let mut page = if root.is_null() {
        IndirectPage::new(revision)
    } else {
        load_indirect(store, wal, root)?.clone_for_revision(revision)
    };
    let new_child = if path.len() == 1 {
        leaf_ref.clone()
    } else {
        let child_ref = if root.is_null() {
            PageReference::null()
        } else {
            load_indirect(store, wal, root)?.child(idx).clone()
        };
        prepare_leaf(store, wal, &child_ref, revision, &path[1..], leaf_ref)?
    };
    page.set_child(idx, new_child);
    let log_key = wal.alloc_log_key();
    wal.insert(log_key, WalEntry::Page(Page::Indirect(page)));
    Ok(PageReference::to_log(PageKind::Indirect, log_key))
}

/// Depth-first: resolves every `log_key` reference reachable from
/// `reference` to a real on-disk offset, writing each staged page to
/// the store exactly once (memoized by `persisted`).
fn materialize(
    store: &PageStore,
    wal: &Wal,
    persisted: &mut HashMap<u64, u64>,
    reference: &PageReference,
) -> Result<PageReference> {
    let log_key = match reference.log_key {
        Some(k) => k,
        None => return Ok(reference.clone()),
    };
    if let Some(&on_disk_key) = persisted.get(&log_key) {
        return Ok(PageReference::to_disk(reference.page_kind.unwrap(), on_disk_key));
    }
    let entry = wal
        .get(log_key)
        .ok_or_else(|| StorageError::corrupt("dangling log_key at commit"))?;
    let page = match entry {
        WalEntry::Page(Page::Indirect(indirect)) => {
            let mut resolved = indirect.clone();
            for i in 0..PAGE_FANOUT {
                let child = resolved.child(i).clone();
                if child.log_key.is_some() {
                    let new_child = materialize(store, wal, persisted, &child)?;
                    resolved.set_child(i, new_child);
                }
            }
            Page::Indirect(resolved)
        }
        other => other.committed_page(),
    };
    let on_disk_key = store.append(&page)?;
    persisted.insert(log_key, on_disk_key);
    Ok(PageReference::to_disk(page.kind(), on_disk_key))
}
