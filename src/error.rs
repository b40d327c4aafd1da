use std::fmt::Display;
use std::io;

/// Docstore errors.
#[derive(Debug)]
pub enum Error {
    /// An IO error without further context.
    Io(io::Error),
    /// An IO error while reading the named structure.
    Read(&'static str, io::Error),
    /// An IO error while writing the named structure.
    Write(&'static str, io::Error),
    /// Invalid data, typically decoding errors or a corrupt table of contents.
    InvalidData(String),
    /// The starts and ends sequences passed to a ranged retrieval differ in length.
    ShapeMismatch { starts: usize, ends: usize },
    /// A negative start or end outside the whole-entry sentinel.
    IllegalRange { start: i32, end: i32 },
    /// A start or end beyond the entry's character length.
    OutOfRange { start: i32, end: i32, length: u32 },
    /// A requested snippet of zero or negative length.
    EmptySnippet { start: i32, end: i32 },
    /// A data file yielded fewer bytes than the table of contents prescribes.
    ShortBlock { expected: usize },
    /// An attempt to encode a block with no characters in it.
    EmptyBlock,
    /// The store directory is locked by another handle.
    Locked(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) | Error::Read(_, err) | Error::Write(_, err) => Some(err),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Read(what, err) => write!(f, "failed to read {what}: {err}"),
            Error::Write(what, err) => write!(f, "failed to write {what}: {err}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::ShapeMismatch { starts, ends } => {
                write!(f, "starts and ends must be of equal length ({starts} != {ends})")
            }
            Error::IllegalRange { start, end } => {
                write!(f, "illegal values, start = {start}, end = {end}")
            }
            Error::OutOfRange { start, end, length } => write!(
                f,
                "value(s) out of range, start = {start}, end = {end}, content length = {length}"
            ),
            Error::EmptySnippet { start, end } => {
                write!(f, "empty or negative length snippet (from {start} to {end})")
            }
            Error::ShortBlock { expected } => {
                write!(f, "short block, fewer than {expected} bytes available")
            }
            Error::EmptyBlock => write!(f, "tried to write an empty block"),
            Error::Locked(dir) => write!(f, "store directory {dir} is locked by another handle"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// A docstore Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;
