//! `NamePage`: the content-hash-keyed name dictionary.
//!
//! Unlike the record-bearing subtrees, a resource has exactly one
//! `NamePage`, referenced directly from the `RevisionRootPage` rather
//! than through an indirect tree.

use std::collections::BTreeMap;

use crate::bytes::{var, Cursor};
use crate::error::Result;

/// One interned name: its raw bytes plus the caller-supplied kind tag
/// (e.g. element vs. attribute name in a tree-structured resource).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameEntry {
    pub bytes: Vec<u8>,
    pub kind: u8,
}

/// Maps a content-hash-derived `name_key` to its interned bytes. Created
/// empty at bootstrap; entries are append-only within a resource's
/// lifetime.
#[derive(Clone, Debug)]
pub struct NamePage {
    pub revision: u32,
    entries: BTreeMap<u32, NameEntry>,
}

impl NamePage {
    pub fn bootstrap(revision: u32) -> Self {
        Self {
            revision,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, name_key: u32) -> Option<&NameEntry> {
        self.entries.get(&name_key)
    }

    pub fn insert(&mut self, name_key: u32, entry: NameEntry) {
        self.entries.insert(name_key, entry);
    }

    pub fn contains(&self, name_key: u32) -> bool {
        self.entries.contains_key(&name_key)
    }

    pub fn clone_for_revision(&self, revision: u32) -> Self {
        Self {
            revision,
            entries: self.entries.clone(),
        }
    }

    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        var::encode_u64(self.entries.len() as u64, &mut out);
        for (key, entry) in &self.entries {
            out.extend_from_slice(&key.to_be_bytes());
            out.push(entry.kind);
            var::encode_u64(entry.bytes.len() as u64, &mut out);
            out.extend_from_slice(&entry.bytes);
        }
        out
    }

    pub fn decode_body(revision: u32, body: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(body);
        let count = cur.take_varu64();
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let key = u32::from_be_bytes(cur.take(4).try_into().unwrap());
            let kind = cur.take_u8();
            let len = cur.take_varu64() as usize;
            let bytes = cur.take(len).to_vec();
            entries.insert(key, NameEntry { bytes, kind });
        }
        Ok(Self { revision, entries })
    }
}
