mod any_fs;
mod archive_fs;
mod directory;
mod disk_fs;
mod entry;
mod zip_index;

pub use any_fs::{AnyBackend, BindOptions, bind, bind_with};
pub use archive_fs::ArchiveBackend;
pub use directory::Directory;
pub use disk_fs::DiskBackend;
pub use entry::{Entry, EntryKind};
pub use zip_index::{ArchiveEntry, ArchiveIndex, CompressionMethod};
