//! Three-tier bounded buffer manager: a pin-counted LRU cache in front
//! of [`crate::io`], so a page read during a transaction rarely has to
//! touch disk twice.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::page::{Page, PageKind};

/// Identifies a cached page by its on-disk key and kind. Two different
/// kinds never collide on the same on-disk key space — keys are
/// allocated per file, not per kind — but keeping `kind` in the map key
/// avoids relying on that as an invariant here too.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: PageKind,
    pub on_disk_key: u64,
}

impl CacheKey {
    pub fn new(kind: PageKind, on_disk_key: u64) -> Self {
        Self { kind, on_disk_key }
    }
}

struct Entry {
    page: Arc<Page>,
    pin_count: u32,
}

struct Tier {
    cache: LruCache<CacheKey, Entry>,
    capacity: usize,
}

impl Tier {
    fn new(capacity: usize) -> Self {
        let backing = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: LruCache::new(backing),
            capacity,
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<Arc<Page>> {
        self.cache.get(key).map(|e| e.page.clone())
    }

    fn insert(&mut self, key: CacheKey, page: Arc<Page>) {
        if let Some(existing) = self.cache.get_mut(&key) {
            existing.page = page;
            return;
        }
        self.cache.put(
            key,
            Entry {
                page,
                pin_count: 0,
            },
        );
        self.enforce_capacity();
    }

    fn pin(&mut self, key: &CacheKey) {
        if let Some(entry) = self.cache.get_mut(key) {
            entry.pin_count += 1;
        }
    }

    fn unpin(&mut self, key: &CacheKey) {
        if let Some(entry) = self.cache.get_mut(key) {
            entry.pin_count = entry.pin_count.saturating_sub(1);
        }
    }

    fn invalidate(&mut self, key: &CacheKey) {
        self.cache.pop(key);
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    fn clear(&mut self) {
        self.cache.clear();
    }

    /// Evicts least-recently-used, unpinned entries until the tier is
    /// within capacity. A tier entirely full of pinned pages is left
    /// over capacity rather than evicted incorrectly; callers that pin
    /// more pages than a tier can hold have mis-sized their cache. This
    /// is treated as a configuration error, not a crash.
    fn enforce_capacity(&mut self) {
        let mut deferred = Vec::new();
        let mut attempts = self.cache.len();
        while self.cache.len() > self.capacity && attempts > 0 {
            attempts -= 1;
            match self.cache.pop_lru() {
                Some((key, entry)) if entry.pin_count > 0 => deferred.push((key, entry)),
                Some(_) => {}
                None => break,
            }
        }
        for (key, entry) in deferred {
            self.cache.put(key, entry);
        }
    }
}

/// The buffer manager proper: three tiers sized independently, because
/// indirect/revision-root pages are touched on every traversal while
/// record pages dominate the working set by volume.
pub struct BufferManager {
    index: Mutex<Tier>,
    record: Mutex<Tier>,
    revision_root: Mutex<Tier>,
}

impl BufferManager {
    pub fn new(index_capacity: usize, record_capacity: usize, revision_root_capacity: usize) -> Self {
        Self {
            index: Mutex::new(Tier::new(index_capacity)),
            record: Mutex::new(Tier::new(record_capacity)),
            revision_root: Mutex::new(Tier::new(revision_root_capacity)),
        }
    }

    fn tier_for(&self, kind: PageKind) -> &Mutex<Tier> {
        match kind {
            PageKind::UberPage | PageKind::RevisionRoot => &self.revision_root,
            PageKind::Indirect => &self.index,
            PageKind::RecordPage
            | PageKind::NamePage
            | PageKind::PathSummaryPage
            | PageKind::CasPage
            | PageKind::PathPage => &self.record,
        }
    }

    pub fn get(&self, key: CacheKey) -> Option<Arc<Page>> {
        self.tier_for(key.kind).lock().get(&key)
    }

    pub fn insert(&self, key: CacheKey, page: Arc<Page>) {
        self.tier_for(key.kind).lock().insert(key, page);
    }

    pub fn pin(&self, key: CacheKey) {
        self.tier_for(key.kind).lock().pin(&key);
    }

    pub fn unpin(&self, key: CacheKey) {
        self.tier_for(key.kind).lock().unpin(&key);
    }

    pub fn invalidate(&self, key: CacheKey) {
        self.tier_for(key.kind).lock().invalidate(&key);
    }

    /// Total resident entry count across all three tiers.
    pub fn occupancy(&self) -> usize {
        self.index.lock().len() + self.record.lock().len() + self.revision_root.lock().len()
    }

    /// Drops every resident entry in all three tiers, pinned or not.
    pub fn clear(&self) {
        self.index.lock().clear();
        self.record.lock().clear();
        self.revision_root.lock().clear();
    }
}
