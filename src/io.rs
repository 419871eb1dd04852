//! Storage I/O: positional file access plus the double-buffered
//! uber-page reference slot at offset 0.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StorageError};

#[cfg(unix)]
mod platform {
    use std::fs::File;
    use std::io::{self, ErrorKind};
    use std::os::unix::fs::FileExt;

    pub fn read_exact(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
        while !dst.is_empty() {
            let read = file.read_at(dst, off)?;
            if read == 0 {
                return Err(io::Error::new(ErrorKind::UnexpectedEof, "read_at reached EOF"));
            }
            let (_, tail) = dst.split_at_mut(read);
            dst = tail;
            off += read as u64;
        }
        Ok(())
    }

    pub fn write_all(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
        while !src.is_empty() {
            let written = file.write_at(src, off)?;
            if written == 0 {
                return Err(io::Error::new(ErrorKind::WriteZero, "write_at wrote zero bytes"));
            }
            src = &src[written..];
            off += written as u64;
        }
        Ok(())
    }
}

#[cfg(windows)]
mod platform {
    use std::fs::File;
    use std::io::{self, ErrorKind};
    use std::os::windows::fs::FileExt;

    pub fn read_exact(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
        while !dst.is_empty() {
            let read = file.seek_read(dst, off)?;
            if read == 0 {
                return Err(io::Error::new(ErrorKind::UnexpectedEof, "seek_read reached EOF"));
            }
            let (_, tail) = dst.split_at_mut(read);
            dst = tail;
            off += read as u64;
        }
        Ok(())
    }

    pub fn write_all(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
        while !src.is_empty() {
            let written = file.seek_write(src, off)?;
            if written == 0 {
                return Err(io::Error::new(ErrorKind::WriteZero, "seek_write wrote zero bytes"));
            }
            src = &src[written..];
            off += written as u64;
        }
        Ok(())
    }
}

/// Positional file access, abstracted so a resource can be backed by
/// plain syscalls or a memory-mapped file
/// (`storageKind=FILE_CHANNEL|MEMORY_MAPPED`).
pub trait FileIo: Send + Sync + 'static {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    fn sync_all(&self) -> Result<()>;
    fn len(&self) -> Result<u64>;
    fn truncate(&self, len: u64) -> Result<()>;
}

/// Plain positional-syscall backend.
#[derive(Clone)]
pub struct StdFileIo {
    inner: Arc<File>,
}

impl StdFileIo {
    pub fn new(file: File) -> Self {
        Self { inner: Arc::new(file) }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::new(file))
    }

    fn file(&self) -> &File {
        &self.inner
    }
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        Ok(platform::read_exact(self.file(), off, dst)?)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        Ok(platform::write_all(self.file(), off, src)?)
    }

    fn sync_all(&self) -> Result<()> {
        Ok(self.file().sync_all()?)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file().metadata()?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        Ok(self.file().set_len(len)?)
    }
}

/// Memory-mapped backend (`storageKind=MEMORY_MAPPED`). The map is
/// recreated whenever a write would extend past its current length,
/// since `memmap2` maps are fixed-size.
///
/// `mmap` itself is the unsafe part of this crate: the kernel cannot
/// guarantee the backing file isn't truncated or modified by another
/// process out from under the mapping. Isolated here so the crate-wide
/// `unsafe_code = "deny"` lint still catches anything outside this type.
pub struct MmapFileIo {
    file: File,
    map: Mutex<memmap2::MmapMut>,
}

impl MmapFileIo {
    #[allow(unsafe_code)]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() == 0 {
            file.set_len(4096)?;
        }
        let map = unsafe { memmap2::MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            map: Mutex::new(map),
        })
    }

    #[allow(unsafe_code)]
    fn remap_at_least(&self, len: u64) -> Result<()> {
        let mut map = self.map.lock();
        if (map.len() as u64) >= len {
            return Ok(());
        }
        self.file.set_len(len)?;
        *map = unsafe { memmap2::MmapMut::map_mut(&self.file)? };
        Ok(())
    }
}

impl FileIo for MmapFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        let map = self.map.lock();
        let start = off as usize;
        let end = start
            .checked_add(dst.len())
            .ok_or_else(|| StorageError::corrupt("read_at offset overflow"))?;
        if end > map.len() {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                "mmap read past end of file",
            )));
        }
        dst.copy_from_slice(&map[start..end]);
        Ok(())
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        let end = off
            .checked_add(src.len() as u64)
            .ok_or_else(|| StorageError::corrupt("write_at offset overflow"))?;
        self.remap_at_least(end)?;
        let mut map = self.map.lock();
        let start = off as usize;
        map[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn sync_all(&self) -> Result<()> {
        self.map.lock().flush()?;
        Ok(self.file.sync_all()?)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    #[allow(unsafe_code)]
    fn truncate(&self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        let mut map = self.map.lock();
        *map = unsafe { memmap2::MmapMut::map_mut(&self.file)? };
        Ok(())
    }
}

/// Size of the double-buffered uber-page reference slot at file offset 0:
/// two 16-byte slots, each `generation:u64 | on_disk_key:u64` with a
/// trailing checksum, so a torn write to one slot never corrupts the
/// other. `A_OFFSET`/`B_OFFSET` mark where each slot begins.
pub const SLOT_SIZE: usize = 16;
pub const SLOT_TRAILER: usize = 4;
pub const SLOT_TOTAL: usize = SLOT_SIZE + SLOT_TRAILER;
pub const UBER_SLOT_REGION_LEN: usize = SLOT_TOTAL * 2;
const A_OFFSET: u64 = 0;
const B_OFFSET: u64 = SLOT_TOTAL as u64;

fn encode_slot(generation: u64, on_disk_key: u64) -> [u8; SLOT_TOTAL] {
    let mut buf = [0u8; SLOT_TOTAL];
    buf[0..8].copy_from_slice(&generation.to_le_bytes());
    buf[8..16].copy_from_slice(&on_disk_key.to_le_bytes());
    let crc = crc32fast::hash(&buf[0..16]);
    buf[16..20].copy_from_slice(&crc.to_le_bytes());
    buf
}

fn decode_slot(buf: &[u8]) -> Option<(u64, u64)> {
    if buf.len() != SLOT_TOTAL {
        return None;
    }
    let crc = crc32fast::hash(&buf[0..16]);
    let stored = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    if crc != stored {
        return None;
    }
    let generation = u64::from_le_bytes(buf[0..8].try_into().unwrap());
    let on_disk_key = u64::from_le_bytes(buf[8..16].try_into().unwrap());
    Some((generation, on_disk_key))
}

/// Reads whichever of the two uber-page slots has the higher generation
/// and a valid checksum. Returns `None` for a freshly-created, all-zero
/// file (bootstrap case).
pub fn read_uber_page_reference(io: &dyn FileIo) -> Result<Option<u64>> {
    if io.len()? < UBER_SLOT_REGION_LEN as u64 {
        return Ok(None);
    }
    let mut a = [0u8; SLOT_TOTAL];
    let mut b = [0u8; SLOT_TOTAL];
    io.read_at(A_OFFSET, &mut a)?;
    io.read_at(B_OFFSET, &mut b)?;
    let slot_a = decode_slot(&a);
    let slot_b = decode_slot(&b);
    let winner = match (slot_a, slot_b) {
        (Some(x), Some(y)) => Some(if x.0 >= y.0 { x } else { y }),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (None, None) => None,
    };
    Ok(winner.map(|(_, key)| key))
}

/// Writes the next generation of the uber-page reference to whichever
/// slot is currently stale, so the other slot remains a valid fallback
/// if the process crashes mid-write.
pub fn write_uber_page_reference(io: &dyn FileIo, on_disk_key: u64) -> Result<()> {
    if io.len()? < UBER_SLOT_REGION_LEN as u64 {
        io.truncate(UBER_SLOT_REGION_LEN as u64)?;
    }
    let mut a = [0u8; SLOT_TOTAL];
    let mut b = [0u8; SLOT_TOTAL];
    io.read_at(A_OFFSET, &mut a)?;
    io.read_at(B_OFFSET, &mut b)?;
    let gen_a = decode_slot(&a).map(|(g, _)| g).unwrap_or(0);
    let gen_b = decode_slot(&b).map(|(g, _)| g).unwrap_or(0);
    let next_gen = gen_a.max(gen_b) + 1;
    let (target_offset, buf) = if gen_a <= gen_b {
        (A_OFFSET, encode_slot(next_gen, on_disk_key))
    } else {
        (B_OFFSET, encode_slot(next_gen, on_disk_key))
    };
    io.write_at(target_offset, &buf)?;
    io.sync_all()?;
    Ok(())
}

/// Truncates the backing file to `new_len`. Callers are responsible for
/// having already rewritten the uber-page reference to point at a root
/// that no longer references anything past `new_len`.
pub fn truncate_to(io: &dyn FileIo, new_len: u64) -> Result<()> {
    io.truncate(new_len.max(UBER_SLOT_REGION_LEN as u64))
}
