//! `RecordPage`: a leaf of a record-bearing subtree.

use std::collections::BTreeMap;

use super::PageKind;
use crate::bytes::{ord, var, Cursor};
use crate::error::Result;

/// Opaque per-record tag. The core never interprets a record's kind
/// beyond the one reserved sentinel [`RecordKind::DELETED`], which marks
/// a tombstone left by [`super::super::write_trx`]'s `remove_entry`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordKind(pub u8);

impl RecordKind {
    pub const DELETED: RecordKind = RecordKind(0xff);

    pub fn is_deleted(self) -> bool {
        self == Self::DELETED
    }
}

/// One `(key, kind, payload)` entry. Payload is opaque bytes;
/// higher layers own its interpretation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: i64,
    pub kind: RecordKind,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn tombstone(key: i64) -> Self {
        Self {
            key,
            kind: RecordKind::DELETED,
            payload: Vec::new(),
        }
    }
}

/// A leaf page holding up to [`super::PAGE_FANOUT`] records, keyed by the
/// low bits of the record key (`page_key = record_key >> PAGE_EXP`).
/// Backs `RecordPage`, `PathSummaryPage`, `CasPage`, and `PathPage` alike —
/// the `kind` field is the only thing that distinguishes which subtree a
/// given instance belongs to.
#[derive(Clone, Debug)]
pub struct RecordPage {
    pub kind: PageKind,
    pub revision: u32,
    pub page_key: u64,
    entries: BTreeMap<i64, Record>,
}

impl RecordPage {
    pub fn new(kind: PageKind, revision: u32, page_key: u64) -> Self {
        Self {
            kind,
            revision,
            page_key,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: i64) -> Option<&Record> {
        self.entries.get(&key)
    }

    pub fn put(&mut self, record: Record) {
        self.entries.insert(record.key, record);
    }

    /// Marks `key` deleted without physically removing the slot, so
    /// readers on an older revision still see the prior value — a key
    /// that existed, then was deleted, then was recreated.
    pub fn mark_deleted(&mut self, key: i64) {
        self.entries.insert(key, Record::tombstone(key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.entries.values()
    }

    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.kind.tag());
        var::encode_u64(self.page_key, &mut out);
        var::encode_u64(self.entries.len() as u64, &mut out);
        for record in self.entries.values() {
            let mut key_buf = [0u8; 8];
            ord::put_i64_be(&mut key_buf, record.key);
            out.extend_from_slice(&key_buf);
            out.push(record.kind.0);
            var::encode_u64(record.payload.len() as u64, &mut out);
            out.extend_from_slice(&record.payload);
        }
        out
    }

    pub fn decode_body(kind: PageKind, revision: u32, body: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(body);
        let _kind_tag = cur.take_u8();
        let page_key = cur.take_varu64();
        let count = cur.take_varu64();
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let key = ord::get_i64_be(cur.take(8));
            let record_kind = RecordKind(cur.take_u8());
            let payload_len = cur.take_varu64() as usize;
            let payload = cur.take(payload_len).to_vec();
            entries.insert(
                key,
                Record {
                    key,
                    kind: record_kind,
                    payload,
                },
            );
        }
        Ok(Self {
            kind,
            revision,
            page_key,
            entries,
        })
    }
}
