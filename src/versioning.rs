//! Versioning strategies: rules for reconstructing a logical `RecordPage`
//! from the historical fragments a copy-on-write page tree accumulates.

use crate::config::RevisioningClass;
use crate::page::{PageKind, RecordPage, PAGE_FANOUT};

/// One page_key's worth of history, collected backward from the read
/// revision. `reconstruct` owns the walk so callers (the read
/// transaction) only supply a per-revision fragment lookup.
pub trait VersioningStrategy: Send + Sync {
    fn name(&self) -> RevisioningClass;

    /// True once the strategy has collected enough fragments and the
    /// backward walk should stop. `is_full` describes the fragment just
    /// pushed (its `entries().len() == PAGE_FANOUT`).
    fn should_stop(&self, fragments_so_far: usize, is_full: bool, max_restore: u32) -> bool;

    /// Walks backward from `revision`. `fetch(r)` resolves the nearest
    /// fragment at or before revision `r` that ever touched `page_key`
    /// (an indirect-tree lookup rooted at `RevisionRootPage(r)` lands on
    /// exactly that fragment, because copy-on-write means every
    /// untouched ancestor still points at the last revision that wrote
    /// it). Each returned fragment carries its own `revision`, which
    /// becomes the next search boundary, so the walk can jump straight
    /// to the next older write instead of probing every revision number.
    fn reconstruct(
        &self,
        kind: PageKind,
        page_key: u64,
        revision: u32,
        max_restore: u32,
        fetch: &mut dyn FnMut(u32) -> Option<RecordPage>,
    ) -> RecordPage {
        let mut fragments: Vec<RecordPage> = Vec::new();
        let mut next_rev = Some(revision);
        while let Some(rev) = next_rev {
            let fragment = match fetch(rev) {
                Some(f) => f,
                None => break,
            };
            let is_full = fragment.len() == PAGE_FANOUT;
            let fragment_revision = fragment.revision;
            fragments.push(fragment);
            if self.should_stop(fragments.len(), is_full, max_restore) {
                break;
            }
            next_rev = fragment_revision.checked_sub(1);
        }
        merge(kind, revision, page_key, fragments)
    }
}

/// Overlays fragments oldest-to-newest so later writes (including
/// tombstones) win per key.
fn merge(kind: PageKind, revision: u32, page_key: u64, newest_first: Vec<RecordPage>) -> RecordPage {
    let mut out = RecordPage::new(kind, revision, page_key);
    for fragment in newest_first.into_iter().rev() {
        for record in fragment.iter() {
            out.put(record.clone());
        }
    }
    out
}

pub struct FullStrategy;

impl VersioningStrategy for FullStrategy {
    fn name(&self) -> RevisioningClass {
        RevisioningClass::Full
    }

    fn should_stop(&self, fragments_so_far: usize, _is_full: bool, _max_restore: u32) -> bool {
        fragments_so_far >= 1
    }
}

pub struct IncrementalStrategy;

impl VersioningStrategy for IncrementalStrategy {
    fn name(&self) -> RevisioningClass {
        RevisioningClass::Incremental
    }

    fn should_stop(&self, _fragments_so_far: usize, is_full: bool, _max_restore: u32) -> bool {
        is_full
    }
}

///// At most two fragments: the newest found, and the last full fragment
/// behind it. Relies on a linear revision history; not defended against
/// a caller skipping revisions.
pub struct DifferentialStrategy;

impl VersioningStrategy for DifferentialStrategy {
    fn name(&self) -> RevisioningClass {
        RevisioningClass::Differential
    }

    fn should_stop(&self, fragments_so_far: usize, is_full: bool, _max_restore: u32) -> bool {
        is_full || fragments_so_far >= 2
    }
}

pub struct SlidingSnapshotStrategy;

impl VersioningStrategy for SlidingSnapshotStrategy {
    fn name(&self) -> RevisioningClass {
        RevisioningClass::SlidingSnapshot
    }

    fn should_stop(&self, fragments_so_far: usize, is_full: bool, max_restore: u32) -> bool {
        is_full || fragments_so_far as u32 >= max_restore
    }
}

pub fn strategy_for(class: RevisioningClass) -> Box<dyn VersioningStrategy> {
    match class {
        RevisioningClass::Full => Box::new(FullStrategy),
        RevisioningClass::Incremental => Box::new(IncrementalStrategy),
        RevisioningClass::Differential => Box::new(DifferentialStrategy),
        RevisioningClass::SlidingSnapshot => Box::new(SlidingSnapshotStrategy),
    }
}
