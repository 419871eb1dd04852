//! `IndirectPage`: one fan-out level of a record subtree or the revision
//! tree.

use super::{PageReference, PAGE_FANOUT};
use crate::bytes::Cursor;
use crate::error::Result;

/// A fixed-size array of [`PAGE_FANOUT`] child references. Every slot
/// starts null; only the path from root to a modified leaf is ever
/// cloned during copy-on-write.
#[derive(Clone, Debug)]
pub struct IndirectPage {
    pub revision: u32,
    children: Vec<PageReference>,
}

impl IndirectPage {
    pub fn new(revision: u32) -> Self {
        Self {
            revision,
            children: (0..PAGE_FANOUT).map(|_| PageReference::null()).collect(),
        }
    }

    pub fn child(&self, index: usize) -> &PageReference {
        &self.children[index]
    }

    pub fn set_child(&mut self, index: usize, reference: PageReference) {
        self.children[index] = reference;
    }

    /// Clones this page for copy-on-write, bumping it to `revision`. Child
    /// references are shared structurally; only this level's array is new.
    pub fn clone_for_revision(&self, revision: u32) -> Self {
        Self {
            revision,
            children: self.children.clone(),
        }
    }

    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for child in &self.children {
            child.encode(&mut out);
        }
        out
    }

    pub fn decode_body(revision: u32, body: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(body);
        let mut children = Vec::with_capacity(PAGE_FANOUT);
        for _ in 0..PAGE_FANOUT {
            children.push(PageReference::decode(&mut cur)?);
        }
        Ok(Self { revision, children })
    }
}

/// Splits `page_key` into per-level fan-out indices, most significant
/// hop first, for a subtree `levels` deep; walking the indirect tree
/// with the shift vector yields the target page_key.
pub fn path_for(page_key: u64, levels: u32) -> Vec<usize> {
    let bits = super::PAGE_EXP_BITS;
    (0..levels)
        .map(|level| {
            let shift = (levels - 1 - level) * bits;
            ((page_key >> shift) as usize) & (PAGE_FANOUT - 1)
        })
        .collect()
}
