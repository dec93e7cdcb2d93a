pub mod codec;
pub mod utils;

use std::io::{Read, Write};

use crate::DirectoryError;
use crate::vfs::Entry;

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// The primitive operations a storage strategy must offer so that a
/// [`Directory`](crate::Directory) can be built on top of it.
///
/// Every `name` passed to these methods is a single entry name directly inside the bound
/// location; nested paths are resolved by `Directory` before a backend is called.
pub trait FsBackend: Sized {
    /// Human readable location of the binding, used in error messages and logs.
    fn location(&self) -> String;

    /// Enumerates the direct children of the bound location, sorted by name.
    fn enumerate(&self) -> Result<Vec<Entry>>;

    /// Binds the subdirectory `name`. Fails if it is not an existing directory.
    fn child(&self, name: &str) -> Result<Self>;

    fn file_size(&self, name: &str) -> Result<u64>;

    /// Size of the stored bytes. Equals `file_size` for backends without compression.
    fn compressed_size(&self, name: &str) -> Result<u64>;

    fn open_read(&self, name: &str) -> Result<Box<dyn Read>>;

    /// Creates or truncates `name`.
    fn open_write(&self, name: &str) -> Result<Box<dyn Write>>;

    /// Creates the subdirectory `name` if it is absent.
    fn create_dir(&self, name: &str) -> Result<()>;

    /// Deletes the file `name`. A missing file is not an error.
    fn remove_file(&self, name: &str) -> Result<()>;
}
