//! `RevisionRootPage`: the per-revision root referencing every subtree.

use super::{PageKind, PageReference};
use crate::bytes::{var, Cursor};
use crate::error::Result;

/// Root plus running record-key counter for one auxiliary index subtree
/// (`PathSummaryPage`, `CasPage`, or `PathPage`). Multiple instances of
/// the same kind may coexist side by side — `record(key, page_kind,
/// index)` selects among them — so each carries its own
/// `max_record_key`.
#[derive(Clone, Debug)]
pub struct AuxSubtree {
    pub kind: PageKind,
    pub root: PageReference,
    pub max_record_key: i64,
}

/// The per-revision root page. Every subtree a resource owns is reachable
/// only through the `RevisionRootPage` for the revision being read, which
/// is what gives snapshot isolation its shape.
#[derive(Clone, Debug)]
pub struct RevisionRootPage {
    pub revision: u32,
    pub revision_timestamp: u64,
    pub main_tree: PageReference,
    pub max_node_key: i64,
    pub name_page: PageReference,
    pub aux_trees: Vec<AuxSubtree>,
}

impl RevisionRootPage {
    pub fn bootstrap(revision: u32, revision_timestamp: u64) -> Self {
        Self {
            revision,
            revision_timestamp,
            main_tree: PageReference::null(),
            max_node_key: -1,
            name_page: PageReference::null(),
            aux_trees: vec![
                AuxSubtree {
                    kind: PageKind::PathSummaryPage,
                    root: PageReference::null(),
                    max_record_key: -1,
                },
                AuxSubtree {
                    kind: PageKind::CasPage,
                    root: PageReference::null(),
                    max_record_key: -1,
                },
                AuxSubtree {
                    kind: PageKind::PathPage,
                    root: PageReference::null(),
                    max_record_key: -1,
                },
            ],
        }
    }

    /// Finds the `index`-th auxiliary subtree of `kind`, if it exists.
    pub fn aux_tree(&self, kind: PageKind, index: usize) -> Option<&AuxSubtree> {
        self.aux_trees
            .iter()
            .filter(|t| t.kind == kind)
            .nth(index)
    }

    pub fn aux_tree_mut(&mut self, kind: PageKind, index: usize) -> Option<&mut AuxSubtree> {
        self.aux_trees
            .iter_mut()
            .filter(|t| t.kind == kind)
            .nth(index)
    }

    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        var::encode_u64(self.revision_timestamp, &mut out);
        self.main_tree.encode(&mut out);
        out.extend_from_slice(&self.max_node_key.to_be_bytes());
        self.name_page.encode(&mut out);
        var::encode_u64(self.aux_trees.len() as u64, &mut out);
        for aux in &self.aux_trees {
            out.push(aux.kind.tag());
            aux.root.encode(&mut out);
            out.extend_from_slice(&aux.max_record_key.to_be_bytes());
        }
        out
    }

    pub fn decode_body(revision: u32, body: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(body);
        let revision_timestamp = cur.take_varu64();
        let main_tree = PageReference::decode(&mut cur)?;
        let max_node_key = i64::from_be_bytes(cur.take(8).try_into().unwrap());
        let name_page = PageReference::decode(&mut cur)?;
        let aux_count = cur.take_varu64();
        let mut aux_trees = Vec::with_capacity(aux_count as usize);
        for _ in 0..aux_count {
            let kind = PageKind::from_tag(cur.take_u8())?;
            let root = PageReference::decode(&mut cur)?;
            let max_record_key = i64::from_be_bytes(cur.take(8).try_into().unwrap());
            aux_trees.push(AuxSubtree {
                kind,
                root,
                max_record_key,
            });
        }
        Ok(Self {
            revision,
            revision_timestamp,
            main_tree,
            max_node_key,
            name_page,
            aux_trees,
        })
    }
}
