use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::codec;
use crate::config::StoreConfig;
use crate::data::DataFiles;
use crate::error::{Error, Result};
use crate::flock::{FileLock, LockError};
use crate::toc::{Toc, TocEntry};

const TOC_FILE: &str = "toc.dat";
const LOCK_FILE: &str = "store.lock";

/// Empty marker file whose name identifies the store format and version.
const TYPE_MARKER_FILE: &str = "utf8_1.type";

/// A persistent content store: maps integer ids to strings and serves
/// arbitrary character-offset substrings without decoding whole documents.
///
/// Strings are stored as UTF-8 in append-only data files. Because the
/// encoding is variable-width, each entry carries a block index pinning
/// character-aligned boundaries to byte offsets: blocks hold a fixed number
/// of characters, so a character range maps to a block range by integer
/// division, and only the intersecting blocks are read and decoded.
///
/// The store is single-owner: an advisory lock on the directory is held for
/// the handle's lifetime, and mutation goes through `&mut self`. Durability
/// is guaranteed after [`close`](ContentStore::close), which persists the
/// table of contents.
pub struct ContentStore {
    dir: PathBuf,
    config: StoreConfig,
    toc: Toc,
    data: DataFiles,
    next_id: u32,
    toc_modified: bool,

    // Bookkeeping for the entry currently being streamed in.
    chars_written: u32,
    bytes_written: u32,
    block_offsets: Vec<u32>,
    current_block: String,
    entry_block_size: u32,

    _lock: FileLock,
}

impl ContentStore {
    /// Open the store in the given directory with default tuning. With
    /// `create` the directory is cleared and re-initialized; without it any
    /// existing table of contents is loaded and the write position restored.
    pub fn open(dir: impl AsRef<Path>, create: bool) -> Result<Self> {
        Self::with_config(dir, create, StoreConfig::default())
    }

    /// Open the store with explicit tuning values.
    pub fn with_config(dir: impl AsRef<Path>, create: bool, config: StoreConfig) -> Result<Self> {
        assert!(
            config.block_size_characters > 0,
            "block size must be positive"
        );
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Error::Write("store directory", e))?;

        let lock = match FileLock::acquire(dir.join(LOCK_FILE)) {
            Ok(lock) => lock,
            Err(LockError::Contended) => return Err(Error::Locked(dir.display().to_string())),
            Err(LockError::Io(e)) => return Err(Error::Io(e)),
        };

        let toc = Toc::new(dir.join(TOC_FILE), config.write_map_reserve);
        let data = DataFiles::new(&dir, config.data_file_size_hint);
        let mut store = Self {
            dir,
            config,
            toc,
            data,
            next_id: 1,
            toc_modified: false,
            chars_written: 0,
            bytes_written: 0,
            block_offsets: Vec::new(),
            current_block: String::new(),
            entry_block_size: 0,
            _lock: lock,
        };

        if store.toc.exists() {
            store.toc.read()?;
            store.recover_counters();
        }
        if create {
            store.clear()?;
            store.write_type_marker()?;
        } else if store.toc.exists() && !store.dir.join(TYPE_MARKER_FILE).exists() {
            tracing::warn!(dir = %store.dir.display(), "store directory has no type marker file");
        }

        tracing::info!(
            dir = %store.dir.display(),
            entries = store.toc.len(),
            next_id = store.next_id,
            "opened content store"
        );
        Ok(store)
    }

    /// Set the block size in characters for subsequent entries. The size in
    /// effect when an entry's first part arrives applies for that whole
    /// entry.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero: a zero block size would make every boundary
    /// computation degenerate during ingestion.
    pub fn set_block_size_characters(&mut self, size: u32) {
        assert!(size > 0, "block size must be positive");
        self.config.block_size_characters = size;
    }

    /// Set the preferred maximum data file size for subsequent entries.
    pub fn set_data_file_size_hint(&mut self, size: u64) {
        self.config.data_file_size_hint = size;
        self.data.set_size_hint(size);
    }

    /// Set the write reserve used by the next table-of-contents write.
    pub fn set_write_map_reserve(&mut self, size: usize) {
        self.config.write_map_reserve = size;
        self.toc.set_write_map_reserve(size);
    }

    /// Store part of a large document. May be called any number of times to
    /// stream a document in chunks, and must be finished by a single call to
    /// [`store`](ContentStore::store), possibly with the empty string.
    pub fn store_part(&mut self, content: &str) -> Result<()> {
        if content.is_empty() {
            return Ok(());
        }
        if self.block_offsets.is_empty() {
            // First offset is always 0. The block size policy is latched
            // with it, so reconfiguration applies to subsequent entries only.
            self.block_offsets.push(0);
            self.entry_block_size = self.config.block_size_characters;
            self.current_block.reserve(self.entry_block_size as usize);
        }
        let block_size = self.entry_block_size;

        self.data.maybe_roll()?;

        // Character offset within the entry once this part is consumed,
        // against which block boundary crossings are detected.
        let after = self.chars_written + content.chars().count() as u32;
        let mut rest = content;
        loop {
            let next_boundary = self.block_offsets.len() as u32 * block_size;
            if after <= next_boundary {
                break;
            }

            // Fill the in-progress block up to the boundary. Zero characters
            // remain when a previous part ended exactly on it.
            let take = next_boundary - self.chars_written;
            if take > 0 {
                let (head, tail) = codec::split_at_chars(rest, take as usize);
                self.current_block.push_str(head);
                self.chars_written += take;
                rest = tail;
            }

            if !self.current_block.is_empty() {
                self.write_current_block()?;
                self.block_offsets.push(self.bytes_written);
            }
        }

        if !rest.is_empty() {
            self.chars_written += rest.chars().count() as u32;
            self.current_block.push_str(rest);
        }
        Ok(())
    }

    /// Store a document (or the final chunk of one streamed via
    /// [`store_part`](ContentStore::store_part)) and assign it an id.
    pub fn store(&mut self, content: &str) -> Result<u32> {
        self.store_part(content)?;
        if !self.current_block.is_empty() {
            // The short final block; it is not recorded in the offsets list.
            self.write_current_block()?;
        }

        let block_size = if self.block_offsets.is_empty() {
            self.config.block_size_characters
        } else {
            self.entry_block_size
        };
        let entry = TocEntry {
            id: self.next_id,
            file_id: self.data.current_file_id(),
            entry_offset_bytes: self.data.current_file_length(),
            entry_length_bytes: self.bytes_written,
            entry_length_characters: self.chars_written,
            block_size_characters: block_size,
            block_offset_bytes: std::mem::take(&mut self.block_offsets),
            deleted: false,
        };
        let id = entry.id;

        self.next_id += 1;
        self.data.advance(self.bytes_written);
        self.toc.insert(entry);
        self.toc_modified = true;

        self.chars_written = 0;
        self.bytes_written = 0;
        self.current_block = String::new();

        // Push buffered bytes to the OS so the entry is readable right away.
        self.data.flush()?;
        Ok(id)
    }

    /// Encode the buffered block, append it to the current data file, and
    /// reset the buffer for the next block.
    fn write_current_block(&mut self) -> Result<()> {
        if self.current_block.is_empty() {
            return Err(Error::EmptyBlock);
        }
        let buf = codec::encode(&self.current_block);
        self.data.append(buf)?;
        self.bytes_written += buf.len() as u32;
        self.current_block.clear();
        Ok(())
    }

    /// Retrieve the document with the given id, or `None` if the id is
    /// unknown or deleted.
    pub fn retrieve(&self, id: u32) -> Result<Option<String>> {
        let parts = self.retrieve_parts(id, &[-1], &[-1])?;
        Ok(parts.map(|mut parts| parts.remove(0)))
    }

    /// Retrieve one or more substrings of the document with the given id,
    /// one per `(starts[i], ends[i])` pair of character offsets. The pair
    /// `(-1, -1)` selects the whole document.
    ///
    /// This is cheaper than retrieving the whole document or issuing separate
    /// calls: the data file is opened once, and each range reads only the
    /// blocks it intersects.
    pub fn retrieve_parts(
        &self,
        id: u32,
        starts: &[i32],
        ends: &[i32],
    ) -> Result<Option<Vec<String>>> {
        let entry = match self.toc.get(id) {
            Some(entry) if !entry.deleted => entry,
            _ => return Ok(None),
        };

        if starts.len() != ends.len() {
            return Err(Error::ShapeMismatch {
                starts: starts.len(),
                ends: ends.len(),
            });
        }

        // The data file is opened lazily so that an empty document, which has
        // no bytes on disk, resolves without touching any file.
        let mut file: Option<File> = None;

        let mut results = Vec::with_capacity(starts.len());
        for (&start, &end) in starts.iter().zip(ends.iter()) {
            match Self::resolve_range(entry, start, end)? {
                None => results.push(String::new()),
                Some((a, b)) => {
                    if file.is_none() {
                        file = Some(self.data.open_for_read(entry.file_id)?);
                    }
                    results.push(Self::read_range(entry, file.as_mut().unwrap(), a, b)?);
                }
            }
        }
        Ok(Some(results))
    }

    /// Check a requested character range against the entry and resolve the
    /// whole-document sentinel. `Ok(None)` means the range is the whole of an
    /// empty document and no bytes need reading.
    fn resolve_range(entry: &TocEntry, start: i32, end: i32) -> Result<Option<(u32, u32)>> {
        let whole = start == -1 && end == -1;
        let (a, b) = if whole {
            (0, entry.entry_length_characters)
        } else {
            if start < 0 || end < 0 {
                return Err(Error::IllegalRange { start, end });
            }
            (start as u32, end as u32)
        };

        if a > entry.entry_length_characters || b > entry.entry_length_characters {
            return Err(Error::OutOfRange {
                start,
                end,
                length: entry.entry_length_characters,
            });
        }
        if whole && b == 0 {
            return Ok(None);
        }
        if b <= a {
            return Err(Error::EmptySnippet { start, end });
        }
        Ok(Some((a, b)))
    }

    /// Read and decode the blocks intersecting characters `[a, b)` of the
    /// entry, then cut the accumulated characters down to the exact range.
    fn read_range(entry: &TocEntry, file: &mut File, a: u32, b: u32) -> Result<String> {
        let first_block = (a / entry.block_size_characters) as usize;
        let last_block = ((b - 1) / entry.block_size_characters) as usize;

        let mut decoded = String::new();
        for block in first_block..=last_block {
            let read_start = entry.block_start_offset(block);
            let read_length = (entry.block_end_offset(block) - read_start) as usize;

            let mut buf = vec![0u8; read_length];
            file.seek(SeekFrom::Start(read_start))
                .map_err(|e| Error::Read("seek to block", e))?;
            match file.read_exact(&mut buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(Error::ShortBlock {
                        expected: read_length,
                    });
                }
                Err(e) => return Err(Error::Read("block data", e)),
            }
            decoded.push_str(&codec::decode(buf)?);
        }

        let first_char = (a % entry.block_size_characters) as usize;
        let length = (b - a) as usize;
        Ok(codec::slice_chars(&decoded, first_char, first_char + length).to_string())
    }

    /// Mark the entry with the given id as deleted. Its bytes keep their
    /// footprint until a compacting run; unknown ids are ignored.
    pub fn delete(&mut self, id: u32) {
        if let Some(entry) = self.toc.get_mut(id) {
            if !entry.deleted {
                entry.deleted = true;
                self.toc_modified = true;
            }
        }
    }

    /// Delete all content in the store: every data file referenced by the
    /// table of contents is removed and the catalog is emptied.
    pub fn clear(&mut self) -> Result<()> {
        self.data.close()?;

        let file_ids: HashSet<u32> = self.toc.entries().map(|e| e.file_id).collect();
        for file_id in file_ids {
            self.data.remove(file_id)?;
        }
        self.toc.clear();
        self.toc_modified = true;
        self.data.reset()?;
        self.next_id = 1;

        self.chars_written = 0;
        self.bytes_written = 0;
        self.block_offsets.clear();
        self.current_block.clear();

        tracing::info!(dir = %self.dir.display(), "cleared content store");
        Ok(())
    }

    /// Close the store: flush the current data file and persist the table of
    /// contents if it was modified.
    pub fn close(&mut self) -> Result<()> {
        self.data.close()?;
        if self.toc_modified {
            self.toc.write()?;
            self.toc_modified = false;
        }
        Ok(())
    }

    /// Directory this store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_type_marker(&self) -> Result<()> {
        File::create(self.dir.join(TYPE_MARKER_FILE))
            .map_err(|e| Error::Write("type marker file", e))?;
        Ok(())
    }

    /// Rebuild the write position and id counter from a freshly loaded
    /// table of contents: the current file is the one with the highest id,
    /// its length the furthest entry end within it, and the next id one past
    /// the highest id ever assigned (deleted entries included).
    fn recover_counters(&mut self) {
        let mut current_file_id = 1;
        let mut current_file_length = 0;
        let mut next_id = 1;

        for entry in self.toc.entries() {
            if entry.file_id > current_file_id {
                current_file_id = entry.file_id;
                current_file_length = 0;
            }
            if entry.file_id == current_file_id {
                let entry_end = entry.entry_offset_bytes + entry.entry_length_bytes;
                if entry_end > current_file_length {
                    current_file_length = entry_end;
                }
            }
            if entry.id + 1 > next_id {
                next_id = entry.id + 1;
            }
        }

        self.data.restore(current_file_id, current_file_length);
        self.next_id = next_id;
    }
}
