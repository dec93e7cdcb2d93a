use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;

use crate::DirectoryError;
use crate::core::codec::{self, Charset};
use crate::core::{FsBackend, Result};
use crate::vfs::zip_index::CompressionMethod;
use crate::vfs::{ArchiveBackend, Directory, DiskBackend, Entry};

/// Either backend, chosen when a root is bound.
#[derive(Debug, Clone)]
pub enum AnyBackend {
    Disk(DiskBackend),
    Archive(ArchiveBackend),
}

impl From<DiskBackend> for AnyBackend {
    fn from(backend: DiskBackend) -> Self {
        AnyBackend::Disk(backend)
    }
}

impl From<ArchiveBackend> for AnyBackend {
    fn from(backend: ArchiveBackend) -> Self {
        AnyBackend::Archive(backend)
    }
}

impl AnyBackend {
    pub fn is_archive(&self) -> bool {
        matches!(self, AnyBackend::Archive(_))
    }
}

macro_rules! delegate {
    ($self:ident, $b:ident => $call:expr) => {
        match $self {
            AnyBackend::Disk($b) => $call,
            AnyBackend::Archive($b) => $call,
        }
    };
}

impl FsBackend for AnyBackend {
    fn location(&self) -> String {
        delegate!(self, b => b.location())
    }

    fn enumerate(&self) -> Result<Vec<Entry>> {
        delegate!(self, b => b.enumerate())
    }

    fn child(&self, name: &str) -> Result<Self> {
        delegate!(self, b => b.child(name).map(AnyBackend::from))
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        delegate!(self, b => b.file_size(name))
    }

    fn compressed_size(&self, name: &str) -> Result<u64> {
        delegate!(self, b => b.compressed_size(name))
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Read>> {
        delegate!(self, b => b.open_read(name))
    }

    fn open_write(&self, name: &str) -> Result<Box<dyn Write>> {
        delegate!(self, b => b.open_write(name))
    }

    fn create_dir(&self, name: &str) -> Result<()> {
        delegate!(self, b => b.create_dir(name))
    }

    fn remove_file(&self, name: &str) -> Result<()> {
        delegate!(self, b => b.remove_file(name))
    }
}

/// How a textual location is turned into a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindOptions {
    /// Charset of percent-encoded bytes in the location.
    pub charset: Charset,
    /// Method used for entries written into an archive tree.
    pub archive_method: CompressionMethod,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            charset: Charset::Utf8,
            archive_method: CompressionMethod::Deflated,
        }
    }
}

impl BindOptions {
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn archive_method(mut self, method: CompressionMethod) -> Self {
        self.archive_method = method;
        self
    }
}

/// Binds a root with default options. See [`bind_with`].
pub fn bind(location: &str) -> Result<Directory<AnyBackend>> {
    bind_with(location, &BindOptions::default())
}

/// Decodes `location` and binds it as a root: a directory gets a disk backend, a file is
/// opened as a container.
pub fn bind_with(location: &str, options: &BindOptions) -> Result<Directory<AnyBackend>> {
    let decoded = codec::decode_location(location, options.charset)?;
    let path = Path::new(&decoded);

    let backend = if path.is_dir() {
        AnyBackend::Disk(DiskBackend::new(path)?)
    } else if path.is_file() {
        AnyBackend::Archive(ArchiveBackend::open_with(path, options.archive_method)?)
    } else {
        return Err(DirectoryError::NotFound(decoded));
    };

    debug!(location = %backend.location(), archive = backend.is_archive(), "bound root");
    Ok(Directory::new(backend))
}
