//! Resource manager: owns storage I/O, the byte-handler pipeline, and
//! the buffer cache for one resource; gates concurrent access and hands
//! out transactions.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::cache::{BufferManager, CacheKey};
use crate::config::ResourceConfig;
use crate::error::{ConcurrencyError, Result, StorageError};
use crate::handler::Pipeline;
use crate::io::{self, FileIo, MmapFileIo, StdFileIo};
use crate::page::{
    decode_frame, encode_frame, path_for, IndirectPage, Page, PageKind, PageReference, RecordPage,
    RevisionRootPage, TreeShape, UberPage,
};
use crate::read_trx::PageReadTrx;
use crate::versioning::{self, VersioningStrategy};
use crate::wal;
use crate::write_trx::PageWriteTrx;

/// Bundles storage I/O, the byte-handler pipeline, and the buffer cache:
/// the three things every transaction needs to dereference a
/// `PageReference`.
#[derive(Clone)]
pub(crate) struct PageStore {
    pub io: Arc<dyn FileIo>,
    pub pipeline: Arc<Pipeline>,
    pub cache: Arc<BufferManager>,
}

impl PageStore {
    /// Loads the page a reference points at, through the cache.
    pub fn load(&self, reference: &PageReference) -> Result<Arc<Page>> {
        let kind = reference
            .page_kind
            .ok_or_else(|| StorageError::usage("page reference has no kind"))?;
        let on_disk_key = reference
            .on_disk_key
            .ok_or_else(|| StorageError::usage("page reference is not yet on disk"))?;
        let cache_key = CacheKey::new(kind, on_disk_key);
        if let Some(page) = self.cache.get(cache_key) {
            return Ok(page);
        }
        let mut len_buf = [0u8; 4];
        self.io.read_at(on_disk_key, &mut len_buf)?;
        let total_len = u32::from_le_bytes(len_buf) as usize;
        let mut frame = vec![0u8; total_len];
        frame[..4].copy_from_slice(&len_buf);
        self.io.read_at(on_disk_key + 4, &mut frame[4..])?;
        let (frame_kind, revision, encoded_body) = decode_frame(&frame)?;
        let body = self.pipeline.decode(&encoded_body)?;
        let page = Page::decode_body(frame_kind, revision, &body)?;
        let page = Arc::new(page);
        self.cache.insert(cache_key, page.clone());
        Ok(page)
    }

    /// Appends a page to the data file, returning its on-disk offset.
    pub fn append(&self, page: &Page) -> Result<u64> {
        let offset = self.io.len()?;
        let body = page.encode_body();
        let encoded = self.pipeline.encode(&body)?;
        let frame = encode_frame(page.kind(), page.revision(), &encoded);
        self.io.write_at(offset, &frame)?;
        Ok(offset)
    }
}

/// Walks `path` from `root`, returning the terminal (leaf) reference, or
/// `None` if any slot along the way is unallocated.
pub(crate) fn resolve_leaf(
    store: &PageStore,
    root: &PageReference,
    path: &[usize],
) -> Result<Option<PageReference>> {
    if root.is_null() {
        return Ok(None);
    }
    if path.is_empty() {
        return Ok(Some(root.clone()));
    }
    let mut current_ref = root.clone();
    for (i, &idx) in path.iter().enumerate() {
        let page = store.load(&current_ref)?;
        let indirect = page
            .as_indirect()
            .ok_or_else(|| StorageError::corrupt("expected indirect page in tree walk"))?;
        let child = indirect.child(idx).clone();
        if child.is_null() {
            return Ok(None);
        }
        if i == path.len() - 1 {
            return Ok(Some(child));
        }
        current_ref = child;
    }
    unreachable!("path is non-empty, loop always returns")
}

pub(crate) fn record_page_at(
    store: &PageStore,
    root: &PageReference,
    levels: u32,
    page_key: u64,
) -> Result<Option<RecordPage>> {
    match resolve_leaf(store, root, &path_for(page_key, levels))? {
        None => Ok(None),
        Some(leaf_ref) => {
            let page = store.load(&leaf_ref)?;
            Ok(page.as_record().cloned())
        }
    }
}

pub(crate) fn revision_root_at(
    store: &PageStore,
    uber: &UberPage,
    revision: u32,
) -> Result<Option<RevisionRootPage>> {
    let path = path_for(revision as u64, uber.shape.revision_tree_levels);
    match resolve_leaf(store, &uber.revision_tree_root, &path)? {
        None => Ok(None),
        Some(leaf_ref) => match &*store.load(&leaf_ref)? {
            Page::RevisionRoot(r) => Ok(Some(r.clone())),
            _ => Err(StorageError::corrupt("revision tree leaf is not a RevisionRootPage")),
        },
    }
}

/// Resolves which subtree `(page_kind, index)` names within a
/// `RevisionRootPage`, returning its root reference and indirect-tree
/// depth.
pub(crate) fn subtree_ref(
    root: &RevisionRootPage,
    uber: &UberPage,
    kind: PageKind,
    index: i32,
) -> Option<(PageReference, u32)> {
    match kind {
        PageKind::RecordPage => Some((root.main_tree.clone(), uber.shape.levels_for(kind))),
        PageKind::PathSummaryPage | PageKind::CasPage | PageKind::PathPage => {
            let idx = if index < 0 { 0 } else { index as usize };
            root.aux_tree(kind, idx).map(|a| (a.root.clone(), uber.shape.levels_for(kind)))
        }
        _ => None,
    }
}

struct GateState {
    readers: u32,
    writer_held: bool,
}

/// In-process counting/binary semaphore pair gating read and write
/// access (`R` read permits, `W = 1` write permit), adapted from the
/// teacher's OS-file-lock coordinator to a configurable in-process
/// permit count with acquire timeouts.
struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
    max_readers: u32,
    timeout: Duration,
}

impl Gate {
    fn new(max_readers: u32, timeout: Duration) -> Self {
        Self {
            state: Mutex::new(GateState {
                readers: 0,
                writer_held: false,
            }),
            cond: Condvar::new(),
            max_readers,
            timeout,
        }
    }

    fn acquire_read(&self) -> Result<()> {
        let mut state = self.state.lock();
        let deadline = Instant::now() + self.timeout;
        while state.readers >= self.max_readers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ConcurrencyError::NoPermit(self.timeout).into());
            }
            self.cond.wait_for(&mut state, remaining);
        }
        state.readers += 1;
        Ok(())
    }

    fn release_read(&self) {
        let mut state = self.state.lock();
        state.readers = state.readers.saturating_sub(1);
        self.cond.notify_all();
    }

    fn acquire_write(&self) -> Result<()> {
        let mut state = self.state.lock();
        let deadline = Instant::now() + self.timeout;
        while state.writer_held {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ConcurrencyError::NoPermit(self.timeout).into());
            }
            self.cond.wait_for(&mut state, remaining);
        }
        state.writer_held = true;
        Ok(())
    }

    fn release_write(&self) {
        let mut state = self.state.lock();
        state.writer_held = false;
        self.cond.notify_all();
    }

    /// Current reader count and whether the write permit is held, for
    /// reporting live-transaction counts without a separate registry.
    fn snapshot(&self) -> (u32, bool) {
        let state = self.state.lock();
        (state.readers, state.writer_held)
    }
}

/// RAII read permit; releasing is automatic on drop, matching the
/// teacher's guard-on-`Drop` release idiom.
pub(crate) struct ReadPermit {
    inner: Arc<Inner>,
}

impl Drop for ReadPermit {
    fn drop(&mut self) {
        self.inner.gate.release_read();
    }
}

pub(crate) struct WritePermit {
    inner: Arc<Inner>,
}

impl Drop for WritePermit {
    fn drop(&mut self) {
        self.inner.gate.release_write();
    }
}

pub(crate) struct Inner {
    pub store: PageStore,
    pub uber: RwLock<Arc<UberPage>>,
    gate: Gate,
    pub strategy: Arc<dyn VersioningStrategy>,
    pub config: ResourceConfig,
    pub commit_lock: Mutex<()>,
    next_read_id: AtomicU64,
    next_write_id: AtomicU64,
    pub resource_dir: PathBuf,
    closed: AtomicBool,
}

impl Inner {
    pub(crate) fn next_read_id(&self) -> u64 {
        self.next_read_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn next_write_id(&self) -> u64 {
        self.next_write_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ConcurrencyError::AlreadyClosed.into())
        } else {
            Ok(())
        }
    }

    pub(crate) fn log_dir(&self) -> PathBuf {
        self.resource_dir.join("log")
    }

    /// Installs the UberPage produced by a successful commit: atomically
    /// swaps the stored UberPage.
    pub(crate) fn install_committed_uber(&self, uber: UberPage) {
        *self.uber.write() = Arc::new(uber);
    }

    pub(crate) fn gate_snapshot(&self) -> (u32, bool) {
        self.gate.snapshot()
    }
}

/// The per-resource singleton: owns the gate, the store, and the
/// committed UberPage, and hands out read/write transactions against them.
pub struct ResourceManager {
    inner: Arc<Inner>,
}

/// Snapshot of resource-level bookkeeping: cache occupancy, current
/// revision, and live-transaction counts.
#[derive(Debug, Clone, Copy)]
pub struct ResourceStats {
    pub newest_revision: u32,
    pub data_file_len: u64,
    pub cache_occupancy: usize,
    pub live_readers: u32,
    pub write_in_progress: bool,
}

impl ResourceManager {
    /// Opens (creating if absent) the resource directory at `dir`, running
    /// crash recovery if a commit marker is present.
    pub fn open(dir: impl AsRef<Path>, config: ResourceConfig) -> Result<Self> {
        let resource_dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(resource_dir.join("data"))?;
        std::fs::create_dir_all(resource_dir.join("log"))?;
        std::fs::create_dir_all(resource_dir.join("indexes"))?;

        let ressetting_path = resource_dir.join("ressetting.obj");
        if !ressetting_path.exists() {
            std::fs::write(&ressetting_path, config.to_json()?)?;
        }

        let data_path = resource_dir.join("data").join("resource.db");
        let io: Arc<dyn FileIo> = match config.storage_kind {
            crate::config::StorageKind::FileChannel => Arc::new(StdFileIo::open(&data_path)?),
            crate::config::StorageKind::MemoryMapped => Arc::new(MmapFileIo::open(&data_path)?),
        };
        let pipeline = Arc::new(Pipeline::from_specs(&config.byte_handler_classes)?);
        let cache = Arc::new(BufferManager::new(
            config.index_cache_capacity,
            config.record_cache_capacity,
            config.revision_root_cache_capacity,
        ));
        let store = PageStore { io, pipeline, cache };

        let log_dir = resource_dir.join("log");
        if wal::marker_exists(&log_dir) {
            tracing::warn!(resource = %resource_dir.display(), "commit marker present, abandoning interrupted commit");
            wal::clear_spill(&log_dir)?;
            wal::delete_marker(&log_dir)?;
        }

        let uber = match io::read_uber_page_reference(&*store.io)? {
            Some(on_disk_key) => {
                let reference = PageReference::to_disk(PageKind::UberPage, on_disk_key);
                match &*store.load(&reference)? {
                    Page::Uber(u) => u.clone(),
                    _ => return Err(StorageError::corrupt("uber-page reference does not point at an UberPage")),
                }
            }
            None => bootstrap(&store)?,
        };

        let strategy = versioning::strategy_for(config.revisioning_class);

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                uber: RwLock::new(Arc::new(uber)),
                gate: Gate::new(config.max_read_permits, Duration::from_millis(config.permit_timeout_ms)),
                strategy: Arc::from(strategy),
                config,
                commit_lock: Mutex::new(()),
                next_read_id: AtomicU64::new(0),
                next_write_id: AtomicU64::new(0),
                resource_dir,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Begins a snapshot-isolated read transaction pinned to `revision`,
    /// or the latest committed revision if `None`.
    pub fn begin_read(&self, revision: Option<u32>) -> Result<PageReadTrx> {
        self.inner.check_open()?;
        self.inner.gate.acquire_read()?;
        let permit = ReadPermit { inner: self.inner.clone() };
        let uber = self.inner.uber.read().clone();
        let target = revision.unwrap_or(uber.newest_revision);
        if target > uber.newest_revision {
            return Err(StorageError::usage(format!(
                "revision {target} exceeds newest committed revision {}",
                uber.newest_revision
            )));
        }
        let revision_root = revision_root_at(&self.inner.store, &uber, target)?
            .ok_or_else(|| StorageError::corrupt(format!("no RevisionRootPage at revision {target}")))?;
        Ok(PageReadTrx::new(
            self.inner.clone(),
            self.inner.store.clone(),
            self.inner.strategy.clone(),
            self.inner.config.numbers_of_revision_to_restore,
            uber,
            revision_root,
            self.inner.next_read_id(),
            Some(permit),
        ))
    }

    /// Begins the single exclusive write transaction for this resource.
    pub fn begin_write(&self) -> Result<PageWriteTrx> {
        self.inner.check_open()?;
        self.inner.gate.acquire_write()?;
        let permit = WritePermit { inner: self.inner.clone() };
        let uber = self.inner.uber.read().clone();
        let base_revision = uber.newest_revision;
        let revision_root = revision_root_at(&self.inner.store, &uber, base_revision)?
            .ok_or_else(|| StorageError::corrupt("no RevisionRootPage at current revision"))?;
        let base_read = PageReadTrx::new(
            self.inner.clone(),
            self.inner.store.clone(),
            self.inner.strategy.clone(),
            self.inner.config.numbers_of_revision_to_restore,
            uber,
            revision_root,
            self.inner.next_read_id(),
            // the write transaction's base read view does not itself hold
            // a read permit: the write permit already excludes other writers.
            None,
        );
        Ok(PageWriteTrx::new(self.inner.clone(), base_read, permit, self.inner.next_write_id()))
    }

    /// Cache occupancy, current revision, and live-transaction counts.
    pub fn stats(&self) -> Result<ResourceStats> {
        let uber = self.inner.uber.read();
        let (live_readers, write_in_progress) = self.inner.gate_snapshot();
        Ok(ResourceStats {
            newest_revision: uber.newest_revision,
            data_file_len: self.inner.store.io.len()?,
            cache_occupancy: self.inner.store.cache.occupancy(),
            live_readers,
            write_in_progress,
        })
    }

    /// Truncates the data file to drop pages unreachable from the latest
    /// committed UberPage. Garbage collection of older, still-reachable
    /// revisions remains out of scope.
    pub fn truncate_to_latest(&self) -> Result<()> {
        let uber = self.inner.uber.read().clone();
        let newest_on_disk = reachable_high_water_mark(&self.inner.store, &uber)?;
        io::truncate_to(&*self.inner.store.io, newest_on_disk)
    }

    /// Closes the resource: every subsequent read/write operation on this
    /// resource or on transactions already open against it fails with
    /// `AlreadyClosed`. A live write transaction can no longer commit, so
    /// its staged changes never reach disk — the effect of a rollback,
    /// without needing a live-transaction registry. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.store.cache.clear();
        self.inner.store.io.sync_all()?;
        Ok(())
    }
}

/// Walks the current UberPage's revision and subtree trees to find the
/// highest on-disk offset any live reference still points at, so
/// [`ResourceManager::truncate_to_latest`] never cuts off a reachable page.
fn reachable_high_water_mark(store: &PageStore, uber: &UberPage) -> Result<u64> {
    let mut high = 0u64;
    let mut stack = vec![uber.revision_tree_root.clone()];
    while let Some(reference) = stack.pop() {
        if reference.is_null() {
            continue;
        }
        let on_disk_key = match reference.on_disk_key {
            Some(k) => k,
            None => continue,
        };
        high = high.max(on_disk_key);
        let page = store.load(&reference)?;
        match &*page {
            Page::Indirect(indirect) => {
                for idx in 0..crate::page::PAGE_FANOUT {
                    stack.push(indirect.child(idx).clone());
                }
            }
            Page::RevisionRoot(root) => {
                stack.push(root.main_tree.clone());
                stack.push(root.name_page.clone());
                for aux in &root.aux_trees {
                    stack.push(aux.root.clone());
                }
            }
            _ => {}
        }
    }
    Ok(high + crate::io::UBER_SLOT_REGION_LEN as u64)
}

/// Creates revision 0 for a fresh resource: an empty `RevisionRootPage`,
/// the singleton indirect-tree chain addressing it, and the `UberPage`
/// that references that chain.
fn bootstrap(store: &PageStore) -> Result<UberPage> {
    let revision_root = RevisionRootPage::bootstrap(0, 0);
    let shape = TreeShape::default_shape();
    let leaf_key = store.append(&Page::RevisionRoot(revision_root))?;
    let leaf_ref = PageReference::to_disk(PageKind::RevisionRoot, leaf_key);
    let path = path_for(0, shape.revision_tree_levels);
    let mut current = leaf_ref;
    for &idx in path.iter().rev() {
        let mut page = IndirectPage::new(0);
        page.set_child(idx, current);
        let key = store.append(&Page::Indirect(page))?;
        current = PageReference::to_disk(PageKind::Indirect, key);
    }
    let uber = UberPage {
        revision: 0,
        newest_revision: 0,
        revision_tree_root: current,
        shape,
    };
    let uber_key = store.append(&Page::Uber(uber.clone()))?;
    io::write_uber_page_reference(&*store.io, uber_key)?;
    Ok(uber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{NULL_KEY, Record, RecordKind};
    use tempfile::tempdir;

    #[test]
    fn bootstrap_creates_empty_revision_zero() {
        let dir = tempdir().unwrap();
        let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        let read = resource.begin_read(None).unwrap();
        assert_eq!(read.revision_number(), 0);
        assert!(read.record(0, PageKind::RecordPage, -1).unwrap().is_none());
    }

    #[test]
    fn reopen_recovers_bootstrap_state() {
        let dir = tempdir().unwrap();
        {
            ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        }
        let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        let read = resource.begin_read(None).unwrap();
        assert_eq!(read.revision_number(), 0);
    }

    #[test]
    fn second_writer_times_out() {
        let dir = tempdir().unwrap();
        let mut config = ResourceConfig::default_config(1);
        config.permit_timeout_ms = 20;
        let resource = ResourceManager::open(dir.path(), config).unwrap();
        let _first = resource.begin_write().unwrap();
        let second = resource.begin_write();
        assert!(second.is_err());
    }

    #[test]
    fn stats_reports_newest_revision() {
        let dir = tempdir().unwrap();
        let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        let stats = resource.stats().unwrap();
        assert_eq!(stats.newest_revision, 0);
        assert!(stats.data_file_len > 0);
        assert_eq!(stats.live_readers, 0);
        assert!(!stats.write_in_progress);
    }

    #[test]
    fn close_fails_open_transactions_and_new_ones() {
        let dir = tempdir().unwrap();
        let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        let read = resource.begin_read(None).unwrap();
        resource.close().unwrap();
        assert!(read.record(0, PageKind::RecordPage, -1).is_err());
        assert!(resource.begin_read(None).is_err());
        assert!(resource.begin_write().is_err());
        resource.close().unwrap();
    }

    #[test]
    fn close_stops_a_live_write_from_committing() {
        let dir = tempdir().unwrap();
        let resource = ResourceManager::open(dir.path(), ResourceConfig::default_config(1)).unwrap();
        let mut write = resource.begin_write().unwrap();
        write
            .create_entry(PageKind::RecordPage, -1, RecordKind(1), b"x".to_vec())
            .unwrap();
        resource.close().unwrap();
        assert!(write.commit().is_err());
    }

    #[test]
    #[allow(unused)]
    fn null_key_is_reserved() {
        assert_eq!(NULL_KEY, -1);
        let _ = Record { key: NULL_KEY, kind: RecordKind(0), payload: vec![] };
    }
}
