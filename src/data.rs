use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// The ordered set of append-only data files backing a store.
///
/// Entry bytes are appended to the current file through a buffered writer
/// that is held open across operations. Once the current file has grown past
/// the size hint, the set rolls over to the next file id before the next
/// entry; an entry never straddles two files.
pub struct DataFiles {
    dir: PathBuf,
    size_hint: u64,
    current_file_id: u32,
    current_file_length: u32,
    writer: Option<BufWriter<File>>,
}

impl DataFiles {
    pub fn new(dir: impl Into<PathBuf>, size_hint: u64) -> Self {
        Self {
            dir: dir.into(),
            size_hint,
            current_file_id: 1,
            current_file_length: 0,
            writer: None,
        }
    }

    /// Path of the data file with the given id.
    pub fn path(&self, file_id: u32) -> PathBuf {
        self.dir.join(format!("data{file_id:04}.dat"))
    }

    /// Open the data file with the given id for random-access reads.
    pub fn open_for_read(&self, file_id: u32) -> Result<File> {
        File::open(self.path(file_id)).map_err(|e| Error::Read("data file", e))
    }

    pub fn current_file_id(&self) -> u32 {
        self.current_file_id
    }

    pub fn current_file_length(&self) -> u32 {
        self.current_file_length
    }

    pub fn set_size_hint(&mut self, size_hint: u64) {
        self.size_hint = size_hint;
    }

    /// Restore the write position, used when reopening an existing store.
    pub fn restore(&mut self, file_id: u32, length: u32) {
        self.current_file_id = file_id;
        self.current_file_length = length;
    }

    /// Account for entry bytes committed to the current file.
    pub fn advance(&mut self, bytes: u32) {
        self.current_file_length += bytes;
    }

    /// Roll over to the next file id if the current file has outgrown the
    /// size hint. Called between entries only; a leftover file under the new
    /// id (from an interrupted earlier run) is removed so appends start from
    /// offset zero.
    pub fn maybe_roll(&mut self) -> Result<()> {
        if self.current_file_length as u64 <= self.size_hint {
            return Ok(());
        }

        self.close()?;
        self.current_file_id += 1;
        self.current_file_length = 0;

        let path = self.path(self.current_file_id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| Error::Write("stale data file removal", e))?;
        }
        tracing::debug!(file_id = self.current_file_id, "rolled over to new data file");
        Ok(())
    }

    /// Append raw block bytes to the current data file, opening it if needed.
    pub fn append(&mut self, buf: &[u8]) -> Result<()> {
        if self.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path(self.current_file_id))
                .map_err(|e| Error::Write("data file", e))?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .unwrap()
            .write_all(buf)
            .map_err(|e| Error::Write("data block", e))
    }

    /// Flush buffered bytes to the operating system.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.flush().map_err(|e| Error::Write("data file flush", e))?;
        }
        Ok(())
    }

    /// Flush and release the held-open writer.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.writer = None;
        Ok(())
    }

    /// Close the writer and reset to the first file id.
    pub fn reset(&mut self) -> Result<()> {
        self.close()?;
        self.current_file_id = 1;
        self.current_file_length = 0;
        Ok(())
    }

    /// Remove the data file with the given id, if it exists.
    pub fn remove(&self, file_id: u32) -> Result<()> {
        let path = self.path(file_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Write("data file removal", e)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_naming() {
        let files = DataFiles::new("/store", 100);
        assert_eq!(files.path(1), Path::new("/store/data0001.dat"));
        assert_eq!(files.path(42), Path::new("/store/data0042.dat"));
        assert_eq!(files.path(12345), Path::new("/store/data12345.dat"));
    }

    #[test]
    fn test_append_and_flush() {
        let dir = TempDir::new().unwrap();
        let mut files = DataFiles::new(dir.path(), 100);

        files.append(b"hello ").unwrap();
        files.append(b"world").unwrap();
        files.flush().unwrap();

        let written = fs::read(files.path(1)).unwrap();
        assert_eq!(written, b"hello world");
    }

    #[test]
    fn test_no_roll_below_hint() {
        let dir = TempDir::new().unwrap();
        let mut files = DataFiles::new(dir.path(), 10);

        files.append(b"0123456789").unwrap();
        files.advance(10);

        // At exactly the hint the current file is kept.
        files.maybe_roll().unwrap();
        assert_eq!(files.current_file_id(), 1);
        assert_eq!(files.current_file_length(), 10);
    }

    #[test]
    fn test_roll_past_hint() {
        let dir = TempDir::new().unwrap();
        let mut files = DataFiles::new(dir.path(), 10);

        files.append(b"0123456789a").unwrap();
        files.advance(11);

        files.maybe_roll().unwrap();
        assert_eq!(files.current_file_id(), 2);
        assert_eq!(files.current_file_length(), 0);

        files.append(b"z").unwrap();
        files.flush().unwrap();
        assert_eq!(fs::read(files.path(2)).unwrap(), b"z");
        // The first file is untouched by the rollover.
        assert_eq!(fs::read(files.path(1)).unwrap(), b"0123456789a");
    }

    #[test]
    fn test_roll_removes_stale_file() {
        let dir = TempDir::new().unwrap();
        let mut files = DataFiles::new(dir.path(), 10);

        // A remnant from an interrupted run under the next file id.
        fs::write(files.path(2), b"stale bytes").unwrap();

        files.append(b"0123456789a").unwrap();
        files.advance(11);
        files.maybe_roll().unwrap();

        assert!(!files.path(2).exists());
        files.append(b"fresh").unwrap();
        files.flush().unwrap();
        assert_eq!(fs::read(files.path(2)).unwrap(), b"fresh");
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let files = DataFiles::new(dir.path(), 10);
        files.remove(7).unwrap();
    }

    #[test]
    fn test_restore() {
        let dir = TempDir::new().unwrap();
        let mut files = DataFiles::new(dir.path(), 100);
        files.restore(3, 55);
        assert_eq!(files.current_file_id(), 3);
        assert_eq!(files.current_file_length(), 55);
    }
}
