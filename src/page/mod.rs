//! On-disk page format and the tagged `Page` variant.

mod indirect;
mod name;
mod record;
mod revision_root;
mod uber;

pub use indirect::IndirectPage;
pub(crate) use indirect::path_for;
pub use name::{NameEntry, NamePage};
pub use record::{Record, RecordKind, RecordPage};
pub use revision_root::{AuxSubtree, RevisionRootPage};
pub use uber::{TreeShape, UberPage};

use crate::bytes::Cursor;
use crate::error::{Result, StorageError};

/// Within-page address width in bits: a [`RecordPage`] holds up to
/// `PAGE_FANOUT` records, and an [`IndirectPage`] fans out to the same
/// count of children. Both reuse this single constant; `PAGE_FANOUT`
/// names both quantities.
pub const PAGE_EXP_BITS: u32 = 7;
/// `2 ^ PAGE_EXP_BITS`.
pub const PAGE_FANOUT: usize = 1 << PAGE_EXP_BITS;

/// Reserved sentinel meaning "no key".
pub const NULL_KEY: i64 = -1;

/// The tagged variant every persisted page carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PageKind {
    UberPage = 0,
    RevisionRoot = 1,
    Indirect = 2,
    RecordPage = 3,
    NamePage = 4,
    PathSummaryPage = 5,
    CasPage = 6,
    PathPage = 7,
}

impl PageKind {
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => PageKind::UberPage,
            1 => PageKind::RevisionRoot,
            2 => PageKind::Indirect,
            3 => PageKind::RecordPage,
            4 => PageKind::NamePage,
            5 => PageKind::PathSummaryPage,
            6 => PageKind::CasPage,
            7 => PageKind::PathPage,
            other => return Err(StorageError::corrupt(format!("unknown page kind tag {other}"))),
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// True for the three auxiliary, uniformly-addressed index subtrees.
    pub fn is_auxiliary(self) -> bool {
        matches!(
            self,
            PageKind::PathSummaryPage | PageKind::CasPage | PageKind::PathPage
        )
    }
}

/// A locator that may point at an on-disk offset, an already-deserialized
/// in-memory page, or a slot in the write transaction's WAL.
/// Exactly one of the three is authoritative at any moment; the write
/// path populates `log_key` first, and commit converts it to
/// `on_disk_key`.
#[derive(Clone, Debug, Default)]
pub struct PageReference {
    pub on_disk_key: Option<u64>,
    pub log_key: Option<u64>,
    pub page_kind: Option<PageKind>,
}

impl PageReference {
    /// A reference to nothing: an unallocated child slot.
    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        self.on_disk_key.is_none() && self.log_key.is_none()
    }

    pub fn to_log(kind: PageKind, log_key: u64) -> Self {
        Self {
            on_disk_key: None,
            log_key: Some(log_key),
            page_kind: Some(kind),
        }
    }

    pub fn to_disk(kind: PageKind, on_disk_key: u64) -> Self {
        Self {
            on_disk_key: Some(on_disk_key),
            log_key: None,
            page_kind: Some(kind),
        }
    }

    /// Encodes as `tag:u8 | on_disk_key:varu64 | page_kind:u8`.
    /// A null reference encodes `on_disk_key = 0` with tag `0`; a
    /// committed disk reference with key `0` is impossible because
    /// offset 0 is always the uber-page slot header, so this is
    /// unambiguous.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self.on_disk_key {
            Some(key) => {
                out.push(1);
                crate::bytes::var::encode_u64(key, out);
                out.push(self.page_kind.map(PageKind::tag).unwrap_or(0));
            }
            None => {
                out.push(0);
                crate::bytes::var::encode_u64(0, out);
                out.push(0);
            }
        }
    }

    pub fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let tag = cur.take_u8();
        let key = cur.take_varu64();
        let kind_tag = cur.take_u8();
        if tag == 0 {
            Ok(Self::null())
        } else {
            Ok(Self {
                on_disk_key: Some(key),
                log_key: None,
                page_kind: Some(PageKind::from_tag(kind_tag)?),
            })
        }
    }
}

/// The tagged union of every page variant that can be cached, staged in a
/// WAL, or written to disk.
#[derive(Clone, Debug)]
pub enum Page {
    Uber(UberPage),
    RevisionRoot(RevisionRootPage),
    Indirect(IndirectPage),
    Record(RecordPage),
    Name(NamePage),
}

impl Page {
    pub fn kind(&self) -> PageKind {
        match self {
            Page::Uber(_) => PageKind::UberPage,
            Page::RevisionRoot(_) => PageKind::RevisionRoot,
            Page::Indirect(_) => PageKind::Indirect,
            Page::Record(p) => p.kind,
            Page::Name(_) => PageKind::NamePage,
        }
    }

    pub fn revision(&self) -> u32 {
        match self {
            Page::Uber(p) => p.revision,
            Page::RevisionRoot(p) => p.revision,
            Page::Indirect(p) => p.revision,
            Page::Record(p) => p.revision,
            Page::Name(p) => p.revision,
        }
    }

    pub fn as_record(&self) -> Option<&RecordPage> {
        match self {
            Page::Record(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut RecordPage> {
        match self {
            Page::Record(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_indirect(&self) -> Option<&IndirectPage> {
        match self {
            Page::Indirect(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_indirect_mut(&mut self) -> Option<&mut IndirectPage> {
        match self {
            Page::Indirect(p) => Some(p),
            _ => None,
        }
    }

    pub fn encode_body(&self) -> Vec<u8> {
        match self {
            Page::Uber(p) => p.encode_body(),
            Page::RevisionRoot(p) => p.encode_body(),
            Page::Indirect(p) => p.encode_body(),
            Page::Record(p) => p.encode_body(),
            Page::Name(p) => p.encode_body(),
        }
    }

    pub fn decode_body(kind: PageKind, revision: u32, body: &[u8]) -> Result<Self> {
        Ok(match kind {
            PageKind::UberPage => Page::Uber(UberPage::decode_body(revision, body)?),
            PageKind::RevisionRoot => {
                Page::RevisionRoot(RevisionRootPage::decode_body(revision, body)?)
            }
            PageKind::Indirect => Page::Indirect(IndirectPage::decode_body(revision, body)?),
            PageKind::RecordPage
            | PageKind::PathSummaryPage
            | PageKind::CasPage
            | PageKind::PathPage => Page::Record(RecordPage::decode_body(kind, revision, body)?),
            PageKind::NamePage => Page::Name(NamePage::decode_body(revision, body)?),
        })
    }
}

/// Frame header length: `length:u32 | kind:u8 | revision:u32`.
pub const FRAME_HEADER_LEN: usize = 4 + 1 + 4;
/// Frame trailer length: `checksum:u32`.
pub const FRAME_TRAILER_LEN: usize = 4;

/// Serializes a page into the on-disk frame
/// `length:u32 | kind:u8 | revision:u32 | body:bytes | checksum:u32`.
/// `body` has already passed through the byte-handler pipeline's
/// `encode`.
pub fn encode_frame(kind: PageKind, revision: u32, body: &[u8]) -> Vec<u8> {
    let total_len = (FRAME_HEADER_LEN + body.len() + FRAME_TRAILER_LEN) as u32;
    let mut out = Vec::with_capacity(total_len as usize);
    out.extend_from_slice(&total_len.to_le_bytes());
    out.push(kind.tag());
    out.extend_from_slice(&revision.to_le_bytes());
    out.extend_from_slice(body);
    let crc = frame_checksum(kind, revision, body);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Checksum over `kind | revision | body`, computed with the same CRC32
/// helper used for meta pages.
pub fn frame_checksum(kind: PageKind, revision: u32, body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[kind.tag()]);
    hasher.update(&revision.to_le_bytes());
    hasher.update(body);
    hasher.finalize()
}

/// Decodes and checksum-verifies a frame previously produced by
/// [`encode_frame`]. Returns `(kind, revision, body)`.
pub fn decode_frame(buf: &[u8]) -> Result<(PageKind, u32, Vec<u8>)> {
    if buf.len() < FRAME_HEADER_LEN + FRAME_TRAILER_LEN {
        return Err(StorageError::corrupt("frame shorter than header+trailer"));
    }
    let total_len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    if total_len != buf.len() {
        return Err(StorageError::corrupt("frame length prefix mismatch"));
    }
    let kind = PageKind::from_tag(buf[4])?;
    let revision = u32::from_le_bytes(buf[5..9].try_into().unwrap());
    let body = &buf[FRAME_HEADER_LEN..buf.len() - FRAME_TRAILER_LEN];
    let stored_crc = u32::from_le_bytes(buf[buf.len() - FRAME_TRAILER_LEN..].try_into().unwrap());
    let crc = frame_checksum(kind, revision, body);
    if crc != stored_crc {
        return Err(StorageError::corrupt("frame checksum mismatch"));
    }
    Ok((kind, revision, body.to_vec()))
}
