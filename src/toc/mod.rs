mod entry;

pub use entry::TocEntry;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::{Mmap, MmapMut};

use crate::error::{Error, Result};

/// The table of contents: the catalog mapping entry id to entry metadata.
///
/// On disk the TOC is a single count followed by the serialized records in
/// arbitrary order. Reads go through a read-only mapping of the whole file.
/// Writes map the file with `write_map_reserve` bytes of extra room so fresh
/// records can be appended in place; when a record no longer fits, the region
/// is unmapped, the file is grown and re-mapped, and writing resumes at the
/// same position.
pub struct Toc {
    path: PathBuf,
    entries: HashMap<u32, TocEntry>,
    write_map_reserve: usize,
}

impl Toc {
    pub fn new(path: impl Into<PathBuf>, write_map_reserve: usize) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
            write_map_reserve,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn set_write_map_reserve(&mut self, reserve: usize) {
        self.write_map_reserve = reserve;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&TocEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut TocEntry> {
        self.entries.get_mut(&id)
    }

    pub fn insert(&mut self, entry: TocEntry) {
        self.entries.insert(entry.id, entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &TocEntry> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Load all records from the TOC file, replacing the in-memory catalog.
    pub fn read(&mut self) -> Result<()> {
        self.entries.clear();

        let file = File::open(&self.path).map_err(|e| Error::Read("toc file", e))?;
        let file_length = file
            .metadata()
            .map_err(|e| Error::Read("toc file metadata", e))?
            .len();
        if file_length == 0 {
            return Ok(());
        }

        let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::Read("toc mapping", e))?;
        let mut cursor = Cursor::new(&map[..]);

        let n = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Read("toc entry count", e))?;
        for _ in 0..n {
            let entry = TocEntry::deserialize(&mut cursor)?;
            self.entries.insert(entry.id, entry);
        }
        Ok(())
    }

    /// Persist the catalog to the TOC file through a writable mapping.
    ///
    /// The mapping initially covers the existing file plus the write reserve.
    /// Growing a live mapping is not possible, so when the next record does
    /// not fit the region is flushed, unmapped, and the file is extended and
    /// re-mapped before writing continues. The file is truncated to its
    /// logical length at the end; trailing reserve bytes never reach readers,
    /// which only consume the recorded count.
    pub fn write(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| Error::Write("toc file", e))?;
        let existing = file
            .metadata()
            .map_err(|e| Error::Read("toc file metadata", e))?
            .len();

        let mut mapped_length = (existing + self.write_map_reserve as u64).max(4);
        file.set_len(mapped_length)
            .map_err(|e| Error::Write("toc file reserve", e))?;
        let mut map =
            unsafe { MmapMut::map_mut(&file) }.map_err(|e| Error::Write("toc mapping", e))?;

        let mut pos = 0usize;
        {
            let mut slice = &mut map[pos..];
            slice
                .write_u32::<LittleEndian>(self.entries.len() as u32)
                .map_err(|e| Error::Write("toc entry count", e))?;
        }
        pos += 4;

        for entry in self.entries.values() {
            if map.len() - pos < entry.size_bytes() {
                // Out of mapped room: unmap, grow the file, re-map, and
                // resume at the same logical position.
                map.flush().map_err(|e| Error::Write("toc mapping flush", e))?;
                drop(map);
                mapped_length =
                    pos as u64 + entry.size_bytes() as u64 + self.write_map_reserve as u64;
                file.set_len(mapped_length)
                    .map_err(|e| Error::Write("toc file reserve", e))?;
                map = unsafe { MmapMut::map_mut(&file) }
                    .map_err(|e| Error::Write("toc mapping", e))?;
            }

            let mut slice = &mut map[pos..pos + entry.size_bytes()];
            entry.serialize(&mut slice)?;
            pos += entry.size_bytes();
        }

        map.flush().map_err(|e| Error::Write("toc mapping flush", e))?;
        drop(map);
        file.set_len(pos as u64)
            .map_err(|e| Error::Write("toc file truncation", e))?;

        tracing::debug!(entries = self.entries.len(), bytes = pos, "wrote toc");
        Ok(())
    }
}
