//! Error kinds shared by every backend and by [`Directory`](crate::Directory).

use std::fmt;
use std::io;

use thiserror::Error;

/// Everything a directory operation can fail with.
///
/// None of these are retried internally; they reach the caller of the operation that
/// triggered them.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// A bound or resolved location is not a directory where one was required.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A named entry is not a file where one was required.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// A named entry does not exist.
    #[error("{0} does not exist")]
    NotFound(String),

    /// The backend failed to read, write, create or delete.
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A location or name could not be decoded or is not a plain entry name.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The container index could not be read.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),
}

impl DirectoryError {
    pub(crate) fn io(path: impl Into<String>, source: io::Error) -> Self {
        DirectoryError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound(_))
    }

    pub fn is_not_a_file(&self) -> bool {
        matches!(self, DirectoryError::NotAFile(_))
    }

    pub fn is_not_a_directory(&self) -> bool {
        matches!(self, DirectoryError::NotADirectory(_))
    }
}

/// The operation during which a per-entry failure was swallowed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    /// A subdirectory was found during enumeration but could not be bound.
    Listing,
    /// The backend failed to delete a file.
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Listing => f.write_str("listing"),
            Operation::Remove => f.write_str("remove"),
        }
    }
}

/// A failure that did not abort the call it happened in.
///
/// Listings omit subdirectories that cannot be bound and removals are best effort; both
/// leave one of these on the node so the caller can decide whether the partial result is
/// acceptable.
#[derive(Debug)]
pub struct EntryFailure {
    pub name: String,
    pub operation: Operation,
    pub error: DirectoryError,
}

impl fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of '{}' failed: {}", self.operation, self.name, self.error)
    }
}
