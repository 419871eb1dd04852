//! `UberPage`: the file-level root, versioned through the double-buffered
//! reference slot at offset 0.

use std::collections::HashMap;

use super::{PageKind, PageReference};
use crate::bytes::{var, Cursor};
use crate::error::{Result, StorageError};

/// Per-subtree-kind depth of the indirect tree that locates a
/// `RevisionRootPage` by revision number, or a `RecordPage` by
/// `page_key`, within that kind's subtree. Every level consumes
/// [`super::PAGE_EXP_BITS`] bits, so a kind's total addressable key range
/// is `PAGE_FANOUT ^ (levels + 1)`.
#[derive(Clone, Debug)]
pub struct TreeShape {
    pub revision_tree_levels: u32,
    pub levels: HashMap<PageKind, u32>,
}

impl TreeShape {
    pub fn default_shape() -> Self {
        let mut levels = HashMap::new();
        levels.insert(PageKind::RecordPage, 3);
        levels.insert(PageKind::PathSummaryPage, 2);
        levels.insert(PageKind::CasPage, 2);
        levels.insert(PageKind::PathPage, 2);
        Self {
            revision_tree_levels: 2,
            levels,
        }
    }

    pub fn levels_for(&self, kind: PageKind) -> u32 {
        self.levels.get(&kind).copied().unwrap_or(2)
    }
}

/// The single root of a resource's page tree: an indirect tree over
/// revision numbers, plus the shape table every subtree's addressing
/// depends on.
#[derive(Clone, Debug)]
pub struct UberPage {
    pub revision: u32,
    pub newest_revision: u32,
    pub revision_tree_root: PageReference,
    pub shape: TreeShape,
}

impl UberPage {
    pub fn bootstrap() -> Self {
        Self {
            revision: 0,
            newest_revision: 0,
            revision_tree_root: PageReference::null(),
            shape: TreeShape::default_shape(),
        }
    }

    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        var::encode_u64(self.newest_revision as u64, &mut out);
        self.revision_tree_root.encode(&mut out);
        var::encode_u64(self.shape.revision_tree_levels as u64, &mut out);
        var::encode_u64(self.shape.levels.len() as u64, &mut out);
        let mut kinds: Vec<_> = self.shape.levels.iter().collect();
        kinds.sort_by_key(|(k, _)| k.tag());
        for (kind, levels) in kinds {
            out.push(kind.tag());
            var::encode_u64(*levels as u64, &mut out);
        }
        out
    }

    pub fn decode_body(revision: u32, body: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(body);
        let newest_revision = cur.take_varu64() as u32;
        let revision_tree_root = PageReference::decode(&mut cur)?;
        let revision_tree_levels = cur.take_varu64() as u32;
        let count = cur.take_varu64();
        let mut levels = HashMap::new();
        for _ in 0..count {
            let kind = PageKind::from_tag(cur.take_u8())?;
            let depth = cur.take_varu64() as u32;
            levels.insert(kind, depth);
        }
        if cur.remaining() != 0 {
            return Err(StorageError::corrupt("trailing bytes in uber-page body"));
        }
        Ok(Self {
            revision,
            newest_revision,
            revision_tree_root,
            shape: TreeShape {
                revision_tree_levels,
                levels,
            },
        })
    }
}
