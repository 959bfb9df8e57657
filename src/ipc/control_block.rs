//! Memory-mapped control block.
//!
//! This type moves bytes and nothing else: it knows offsets, not requests.
//! There is no locking. Each field has exactly one writing process, and the
//! three sequence words are published with release stores after the data they
//! guard, then read back with acquire loads.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::MmapMut;
use tracing::debug;

use crate::common::error::{CardError, CardResult};

use super::layout::REGION_SIZE;

/// A read-write mapping of the shared region.
pub struct ControlBlock {
    map: MmapMut,
    path: PathBuf,
}

impl ControlBlock {
    /// Map an existing backing file. Missing, read-only or undersized files are transport errors.
    pub fn open(path: impl AsRef<Path>) -> CardResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| CardError::transport(format!("open {}: {e}", path.display())))?;
        Self::map_file(&file, path)
    }

    /// Create a new backing file sized to the full region and map it.
    ///
    /// Fails if the file already exists, so two requesters never share one region.
    pub fn create(path: impl AsRef<Path>) -> CardResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| CardError::transport(format!("create {}: {e}", path.display())))?;
        file.set_len(REGION_SIZE as u64)
            .map_err(|e| CardError::transport(format!("size {}: {e}", path.display())))?;
        Self::map_file(&file, path)
    }

    fn map_file(file: &File, path: &Path) -> CardResult<Self> {
        let len = file
            .metadata()
            .map_err(|e| CardError::transport(format!("stat {}: {e}", path.display())))?
            .len();
        if len < REGION_SIZE as u64 {
            return Err(CardError::transport(format!(
                "{} is {len} bytes, need at least {REGION_SIZE}",
                path.display()
            )));
        }

        // SAFETY: the mapping is shared with exactly one peer process that follows the
        // single-writer-per-field layout; nothing here truncates the file while mapped.
        let map = unsafe { MmapMut::map_mut(file) }
            .map_err(|e| CardError::transport(format!("mmap {}: {e}", path.display())))?;

        debug!(ev = "region_mapped", path = %path.display(), len);
        Ok(Self {
            map,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// # Panics
    /// If `offset + 4` lies outside the mapping. Header offsets never do.
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.map[offset..offset + 4]);
        u32::from_le_bytes(raw)
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.map[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// # Panics
    /// If `offset + 8` lies outside the mapping. Header offsets never do.
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.map[offset..offset + 8]);
        u64::from_le_bytes(raw)
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.map[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn read_f64(&self, offset: usize) -> f64 {
        f64::from_bits(self.read_u64(offset))
    }

    pub fn write_f64(&mut self, offset: usize, value: f64) {
        self.write_u64(offset, value.to_bits());
    }

    /// Borrow `len` bytes at `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> CardResult<&[u8]> {
        let end = self.checked_end(offset, len)?;
        Ok(&self.map[offset..end])
    }

    /// Copy `bytes` into the region at `offset`.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> CardResult<()> {
        let end = self.checked_end(offset, bytes.len())?;
        self.map[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn checked_end(&self, offset: usize, len: usize) -> CardResult<usize> {
        offset
            .checked_add(len)
            .filter(|end| *end <= self.map.len())
            .ok_or_else(|| {
                CardError::transport(format!(
                    "range {offset}+{len} outside region of {} bytes",
                    self.map.len()
                ))
            })
    }

    /// Acquire-load a sequence word written by the peer.
    pub fn load_seq(&self, offset: usize) -> u64 {
        u64::from_le(self.seq_word(offset).load(Ordering::Acquire))
    }

    /// Release-store a sequence word. Every write issued before this call is
    /// visible to a peer that observes the new value.
    pub fn publish_seq(&mut self, offset: usize, value: u64) {
        assert!(offset % 8 == 0 && offset + 8 <= self.map.len());
        // SAFETY: see `seq_word`; the pointer comes from the mutable mapping.
        let word = unsafe { &*(self.map.as_mut_ptr().add(offset) as *const AtomicU64) };
        word.store(value.to_le(), Ordering::Release);
    }

    fn seq_word(&self, offset: usize) -> &AtomicU64 {
        assert!(offset % 8 == 0 && offset + 8 <= self.map.len());
        // SAFETY: the mapping is page aligned and `offset` is a multiple of 8 inside
        // it, so the pointer is valid and aligned for AtomicU64. The word lives as
        // long as `self.map`.
        unsafe { &*(self.map.as_ptr().add(offset) as *const AtomicU64) }
    }

    /// Release the mapping. The backing file is left in place for its owner to remove.
    pub fn close(self) {
        debug!(ev = "region_unmapped", path = %self.path.display());
        drop(self.map);
    }
}
