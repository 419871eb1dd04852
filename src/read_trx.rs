//! Page read transaction: a snapshot-isolated view pinned to one
//! revision, reconstructing records through the configured versioning
//! strategy.

use std::cell::RefCell;
use std::sync::Arc;

use crate::error::{ConcurrencyError, Result, StorageError};
use crate::page::{PageKind, Record, RecordPage, RevisionRootPage, UberPage, PAGE_EXP_BITS};
use crate::resource::{record_page_at, revision_root_at, subtree_ref, Inner, PageStore, ReadPermit};
use crate::versioning::VersioningStrategy;

/// A read-only snapshot of a resource at a fixed revision. Readers never
/// block each other or a concurrent writer: once `revision_root` is
/// captured at `begin_read`, every lookup walks pages reachable only
/// from that frozen root.
pub struct PageReadTrx {
    inner: Arc<Inner>,
    pub(crate) store: PageStore,
    strategy: Arc<dyn VersioningStrategy>,
    max_restore: u32,
    uber: Arc<UberPage>,
    revision_root: RevisionRootPage,
    txn_id: u64,
    permit: Option<ReadPermit>,
    closed: bool,
}

impl PageReadTrx {
    pub(crate) fn new(
        inner: Arc<Inner>,
        store: PageStore,
        strategy: Arc<dyn VersioningStrategy>,
        max_restore: u32,
        uber: Arc<UberPage>,
        revision_root: RevisionRootPage,
        txn_id: u64,
        permit: Option<ReadPermit>,
    ) -> Self {
        Self {
            inner,
            store,
            strategy,
            max_restore,
            uber,
            revision_root,
            txn_id,
            permit,
            closed: false,
        }
    }

    /// Looks up one record by key within the named subtree. `index`
    /// selects among sibling auxiliary subtrees of the same kind;
    /// ignored for `RecordPage`. Returns `None` for an absent key or one
    /// whose latest write was a tombstone.
    pub fn record(&self, key: i64, page_kind: PageKind, index: i32) -> Result<Option<Record>> {
        if self.closed {
            return Err(ConcurrencyError::AlreadyClosed.into());
        }
        self.inner.check_open()?;
        if key < 0 {
            return Err(StorageError::usage("record key must be non-negative"));
        }
        let page_key = (key as u64) >> PAGE_EXP_BITS;
        let merged = self.reconstruct_page(page_kind, index, page_key)?;
        Ok(match merged.get(key) {
            Some(record) if !record.kind.is_deleted() => Some(record.clone()),
            _ => None,
        })
    }

    pub(crate) fn uber(&self) -> &Arc<UberPage> {
        &self.uber
    }

    /// Reconstructs the logical `RecordPage` at `page_key` by walking
    /// backward from this transaction's revision through the configured
    /// [`VersioningStrategy`]. Exposed to [`crate::write_trx`] so a write
    /// transaction can seed a fresh fragment from the same merged view a
    /// reader would see.
    pub(crate) fn reconstruct_page(&self, page_kind: PageKind, index: i32, page_key: u64) -> Result<RecordPage> {
        let store = &self.store;
        let uber = &self.uber;
        let error: RefCell<Option<StorageError>> = RefCell::new(None);
        let mut fetch = |rev: u32| -> Option<RecordPage> {
            let resolved = (|| -> Result<Option<RecordPage>> {
                let revision_root = match revision_root_at(store, uber, rev)? {
                    Some(r) => r,
                    None => return Ok(None),
                };
                let (root_ref, levels) = match subtree_ref(&revision_root, uber, page_kind, index) {
                    Some(v) => v,
                    None => return Ok(None),
                };
                record_page_at(store, &root_ref, levels, page_key)
            })();
            match resolved {
                Ok(v) => v,
                Err(e) => {
                    *error.borrow_mut() = Some(e);
                    None
                }
            }
        };
        let merged = self.strategy.reconstruct(
            page_kind,
            page_key,
            self.revision_root.revision,
            self.max_restore,
            &mut fetch,
        );
        if let Some(e) = error.into_inner() {
            return Err(e);
        }
        Ok(merged)
    }

    pub fn revision_root(&self) -> &RevisionRootPage {
        &self.revision_root
    }

    pub fn revision_number(&self) -> u32 {
        self.revision_root.revision
    }

    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the read permit. Closing twice is not an error.
    pub fn close(&mut self) -> Result<()> {
        self.permit = None;
        self.closed = true;
        Ok(())
    }
}
