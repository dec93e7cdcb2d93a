//! This module provides the backend that maps a directory node onto a real directory on
//! the host system, such as the tree a package is decoded into.
//!
//! ### Key Features:
//! - **Validated binding**: a backend only exists for a path that is an existing directory.
//! - **Plain names**: child paths are the bound path joined with the entry name.
//! - **No compression layer**: the stored size of a file is its length.
//! - **Best-effort removal**: deleting a file that is already gone succeeds.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

use crate::DirectoryError;
use crate::core::{FsBackend, Result, codec};
use crate::vfs::Entry;

/// A backend bound to one directory on the host file system.
///
/// ### Usage notes:
/// - Symbolic links are followed when entries are classified: a link to a file lists as a
///   file, a link to a directory lists as a directory, a dangling link is reported as a
///   directory that cannot be bound.
/// - Entries whose names are not valid UTF-8 are skipped with a warning.
/// - Not thread‑safe in the sense that concurrent writers are not coordinated.
///
/// ### Example:
/// ```no_run
/// use pkgdir_kit::{DiskBackend, FsBackend};
///
/// let backend = DiskBackend::new("/tmp/decoded-app").unwrap();
/// for entry in backend.enumerate().unwrap() {
///     println!("{} {:?}", entry.name(), entry.kind());
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskBackend {
    dir: PathBuf, // host-related path of an existing directory
}

impl DiskBackend {
    /// Binds `dir`. Fails with `NotADirectory` unless `dir` is an existing directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err(DirectoryError::InvalidPath("empty".into()));
        }
        if !dir.is_dir() {
            return Err(DirectoryError::NotADirectory(dir.display().to_string()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Binds `folder` inside `base`.
    ///
    /// Encoded spaces in `base` are decoded first; `folder` is used verbatim.
    pub fn with_folder<P: AsRef<Path>>(base: P, folder: &str) -> Result<Self> {
        let base = codec::decode_spaces(&base.as_ref().to_string_lossy());
        Self::new(PathBuf::from(base).join(folder))
    }

    /// Returns the bound host path.
    pub fn path(&self) -> &Path {
        self.dir.as_path()
    }

    fn host_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn io_error(&self, name: &str, source: io::Error) -> DirectoryError {
        DirectoryError::io(self.host_path(name).display().to_string(), source)
    }

    fn file_metadata(&self, name: &str) -> Result<fs::Metadata> {
        let host = self.host_path(name);
        match fs::metadata(&host) {
            Ok(meta) if meta.is_file() => Ok(meta),
            Ok(_) => Err(DirectoryError::NotAFile(host.display().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(DirectoryError::NotFound(host.display().to_string()))
            }
            Err(e) => Err(self.io_error(name, e)),
        }
    }
}

impl FsBackend for DiskBackend {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    /// Lists the direct children of the bound directory, sorted by name.
    ///
    /// Anything that is not a regular file (after following links) is reported as a
    /// directory; binding it later decides whether it really is one.
    fn enumerate(&self) -> Result<Vec<Entry>> {
        let read_dir = fs::read_dir(&self.dir).map_err(|e| DirectoryError::io(self.location(), e))?;

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| DirectoryError::io(self.location(), e))?;
            let name = match item.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(dir = %self.dir.display(), name = ?raw, "skipping entry with non UTF-8 name");
                    continue;
                }
            };
            match fs::metadata(item.path()) {
                Ok(meta) if meta.is_file() => entries.push(Entry::file(name, meta.len(), meta.len())),
                _ => entries.push(Entry::dir(name)),
            }
        }
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(entries)
    }

    fn child(&self, name: &str) -> Result<Self> {
        Self::new(self.host_path(name))
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(self.file_metadata(name)?.len())
    }

    fn compressed_size(&self, name: &str) -> Result<u64> {
        self.file_size(name)
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Read>> {
        let host = self.host_path(name);
        trace!(path = %host.display(), "open for reading");
        let file = File::open(&host).map_err(|e| self.io_error(name, e))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, name: &str) -> Result<Box<dyn Write>> {
        let host = self.host_path(name);
        trace!(path = %host.display(), "open for writing");
        let file = File::create(&host).map_err(|e| self.io_error(name, e))?;
        Ok(Box::new(file))
    }

    /// Creates the subdirectory if absent. An existing directory is not an error.
    fn create_dir(&self, name: &str) -> Result<()> {
        let host = self.host_path(name);
        if host.exists() && !host.is_dir() {
            return Err(DirectoryError::NotADirectory(host.display().to_string()));
        }
        fs::create_dir_all(&host).map_err(|e| self.io_error(name, e))
    }

    fn remove_file(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.host_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(name, e)),
        }
    }
}
