use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Why taking the store lock failed.
#[derive(Debug)]
pub enum LockError {
    /// Another handle already holds the lock.
    Contended,
    /// The lock file could not be created or locked.
    Io(io::Error),
}

/// An exclusive advisory lock on a store directory, held for the lifetime of
/// the value and released by the OS when it is dropped.
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Take the lock at the given path, failing fast with
    /// [`LockError::Contended`] when another handle holds it.
    ///
    /// The file is locked before it is written: truncating up front would
    /// clobber the current holder's record on a failed acquisition. Once the
    /// lock is ours, the holder's process id replaces whatever a previous
    /// owner left behind.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(LockError::Io)?;

        exclusive(&file)?;

        // Pid of the holder, for diagnosing stale lock files.
        file.set_len(0).map_err(LockError::Io)?;
        writeln!(file, "{}", std::process::id()).map_err(LockError::Io)?;
        file.flush().map_err(LockError::Io)?;

        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock. The file itself stays to
        // avoid unlink races with a concurrent acquisition.
    }
}

#[cfg(unix)]
fn exclusive(file: &File) -> Result<(), LockError> {
    use std::os::unix::io::AsRawFd;

    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    match err.kind() {
        io::ErrorKind::WouldBlock => Err(LockError::Contended),
        _ => Err(LockError::Io(err)),
    }
}

#[cfg(windows)]
fn exclusive(file: &File) -> Result<(), LockError> {
    use std::os::windows::io::AsRawHandle;
    use winapi::shared::winerror::ERROR_LOCK_VIOLATION;
    use winapi::um::fileapi::LockFileEx;
    use winapi::um::minwinbase::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY};

    let mut overlapped = unsafe { std::mem::zeroed() };
    let locked = unsafe {
        LockFileEx(
            file.as_raw_handle() as *mut _,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            !0,
            !0,
            &mut overlapped,
        )
    };
    if locked != 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    // Contention surfaces as ERROR_LOCK_VIOLATION, which std does not map to
    // a dedicated ErrorKind; match the raw code.
    match err.raw_os_error() {
        Some(code) if code == ERROR_LOCK_VIOLATION as i32 => Err(LockError::Contended),
        _ => Err(LockError::Io(err)),
    }
}

#[cfg(not(any(unix, windows)))]
fn exclusive(_file: &File) -> Result<(), LockError> {
    // No advisory locks here; single ownership is then only enforced within
    // the process.
    Ok(())
}
