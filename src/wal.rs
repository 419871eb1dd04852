//! Transaction log: the in-memory WAL a write transaction stages its
//! pages in, its spill-to-disk backing, and the commit-marker file that
//! drives crash recovery.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::page::{decode_frame, encode_frame, Page, PageKind, RecordPage};

/// What a WAL slot holds. Indirect/revision-root pages are cloned and
/// mutated in place; record-bearing containers instead hold a read-only
/// merged `complete` view (for in-transaction reads) alongside the
/// `modified` fragment, which starts empty and accumulates only this
/// transaction's own writes — that fragment, not the merged view, is
/// what commit actually persists.
pub enum WalEntry {
    Page(Page),
    RecordContainer {
        complete: RecordPage,
        modified: RecordPage,
    },
}

impl WalEntry {
    /// The page that commit actually persists for this slot.
    pub fn committed_page(&self) -> Page {
        match self {
            WalEntry::Page(p) => p.clone(),
            WalEntry::RecordContainer { modified, .. } => Page::Record(modified.clone()),
        }
    }

    pub fn kind(&self) -> PageKind {
        match self {
            WalEntry::Page(p) => p.kind(),
            WalEntry::RecordContainer { modified, .. } => modified.kind,
        }
    }
}

/// A single transaction's staged pages, keyed by `log_key`.
pub struct Wal {
    entries: HashMap<u64, WalEntry>,
    next_log_key: u64,
    frames_appended: u64,
    bytes_spilled: u64,
    spill_syncs: u64,
}

/// Counters describing one transaction's use of its [`Wal`]: frames
/// staged, bytes written to the spill segments, and how many times the
/// spill path has fsynced a segment file.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalStats {
    pub frames_appended: u64,
    pub bytes_spilled: u64,
    pub spill_syncs: u64,
}

impl Wal {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_log_key: 0,
            frames_appended: 0,
            bytes_spilled: 0,
            spill_syncs: 0,
        }
    }

    pub fn alloc_log_key(&mut self) -> u64 {
        let key = self.next_log_key;
        self.next_log_key += 1;
        key
    }

    pub fn stats(&self) -> WalStats {
        WalStats {
            frames_appended: self.frames_appended,
            bytes_spilled: self.bytes_spilled,
            spill_syncs: self.spill_syncs,
        }
    }

    pub fn get(&self, log_key: u64) -> Option<&WalEntry> {
        self.entries.get(&log_key)
    }

    pub fn get_mut(&mut self, log_key: u64) -> Option<&mut WalEntry> {
        self.entries.get_mut(&log_key)
    }

    pub fn insert(&mut self, log_key: u64, entry: WalEntry) {
        self.entries.insert(log_key, entry);
        self.frames_appended += 1;
    }

    pub fn contains(&self, log_key: u64) -> bool {
        self.entries.contains_key(&log_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &WalEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Discards all staged pages and resets key assignment and counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_log_key = 0;
        self.frames_appended = 0;
        self.bytes_spilled = 0;
        self.spill_syncs = 0;
    }
}

impl Default for Wal {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of one subtree kind's spill segment file.
fn segment_file_name(kind: PageKind) -> &'static str {
    match kind {
        PageKind::UberPage => "uber.seg",
        PageKind::RevisionRoot => "revision_root.seg",
        PageKind::Indirect => "indirect.seg",
        PageKind::RecordPage => "record.seg",
        PageKind::NamePage => "name.seg",
        PageKind::PathSummaryPage => "path_summary.seg",
        PageKind::CasPage => "cas.seg",
        PageKind::PathPage => "path.seg",
    }
}

/// Spills every staged page to its subtree's segment file inside `log_dir`,
/// each entry framed as `log_key:u64 | frame` where `frame` is the same
/// length-prefixed, checksummed encoding used on the main data file: a
/// set of append-only files, one per subtree kind.
pub fn spill(log_dir: &Path, wal: &mut Wal) -> Result<()> {
    fs::create_dir_all(log_dir)?;
    use std::collections::BTreeMap;
    use std::io::Write;
    let mut by_kind: BTreeMap<PageKind, Vec<(u64, Page)>> = BTreeMap::new();
    for (log_key, entry) in wal.iter() {
        by_kind
            .entry(entry.kind())
            .or_default()
            .push((*log_key, entry.committed_page()));
    }
    for (kind, pages) in by_kind {
        let path = log_dir.join(segment_file_name(kind));
        let mut file = File::create(&path)?;
        for (log_key, page) in pages {
            let frame = encode_frame(kind, page.revision(), &page.encode_body());
            file.write_all(&log_key.to_le_bytes())?;
            file.write_all(&frame)?;
            wal.bytes_spilled += 8 + frame.len() as u64;
        }
        file.sync_all()?;
        wal.spill_syncs += 1;
    }
    Ok(())
}

/// Replays every subtree's segment file in `log_dir` into a `log_key ->
/// Page` map, a read-only cache keyed by `log_key`. Missing files are
/// treated as empty.
pub fn replay(log_dir: &Path) -> Result<HashMap<u64, Page>> {
    let mut out = HashMap::new();
    let kinds = [
        PageKind::UberPage,
        PageKind::RevisionRoot,
        PageKind::Indirect,
        PageKind::RecordPage,
        PageKind::NamePage,
        PageKind::PathSummaryPage,
        PageKind::CasPage,
        PageKind::PathPage,
    ];
    for kind in kinds {
        let path = log_dir.join(segment_file_name(kind));
        if !path.exists() {
            continue;
        }
        let bytes = fs::read(&path)?;
        let mut offset = 0usize;
        while offset + 8 <= bytes.len() {
            let log_key = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
            offset += 8;
            if offset + 4 > bytes.len() {
                break;
            }
            let frame_len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            if offset + frame_len > bytes.len() {
                break;
            }
            let frame = &bytes[offset..offset + frame_len];
            offset += frame_len;
            if let Ok((frame_kind, revision, body)) = decode_frame(frame) {
                if let Ok(page) = Page::decode_body(frame_kind, revision, &body) {
                    out.insert(log_key, page);
                }
            }
        }
    }
    Ok(out)
}

/// Removes any spill segment files left from a prior transaction (called
/// after a successful commit or an abandoned recovery).
pub fn clear_spill(log_dir: &Path) -> Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }
    for kind in [
        PageKind::UberPage,
        PageKind::RevisionRoot,
        PageKind::Indirect,
        PageKind::RecordPage,
        PageKind::NamePage,
        PageKind::PathSummaryPage,
        PageKind::CasPage,
        PageKind::PathPage,
    ] {
        let path = log_dir.join(segment_file_name(kind));
        if path.exists() {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

const COMMIT_MARKER_NAME: &str = ".commit";

pub fn marker_path(log_dir: &Path) -> PathBuf {
    log_dir.join(COMMIT_MARKER_NAME)
}

/// Creates the zero-length commit-marker file. Its presence means "a
/// commit is in progress or was interrupted".
pub fn create_marker(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)?;
    File::create(marker_path(log_dir))?;
    Ok(())
}

pub fn marker_exists(log_dir: &Path) -> bool {
    marker_path(log_dir).exists()
}

pub fn delete_marker(log_dir: &Path) -> Result<()> {
    let path = marker_path(log_dir);
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
