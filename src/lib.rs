//! Virtual directory trees for package reverse engineering.
//!
//! ### Overview
//!
//! `pkgdir-kit` gives the decoder, the builder and the packer of a package toolkit one way
//! to look at a tree of files, whether it is a decoded project on disk or the entry index
//! of a ZIP-based container. Every node is a [`Directory`] over an [`FsBackend`]; the two
//! shipped backends are [`DiskBackend`] (a host directory) and [`ArchiveBackend`] (one
//! name prefix inside an [`ArchiveIndex`]).
//!
//! **Key ideas**:
//! - **One API**: resolution, sizes, streams, creation and removal work the same on both backends.
//! - **Lazy listings**: a node enumerates its backend once and keeps sorted name sets until it is mutated.
//! - **Cross-backend copies**: [`Directory::copy_to`] moves a subtree from disk into a container and back.
//! - **Encoded locations**: [`bind`] accepts percent-encoded paths as produced by URL-style resource locators.
//!
//! ### Example
//! ```no_run
//! use pkgdir_kit::bind;
//!
//! let mut apk = bind("/tmp/app.apk").unwrap();
//! apk.extract_to("/tmp/app-decoded").unwrap();
//! for name in apk.resolve("res/values").unwrap().list_files().unwrap() {
//!     println!("{name}");
//! }
//! ```

mod core;
mod error;
mod vfs;

pub use crate::core::codec::{Charset, decode_location, decode_spaces};
pub use crate::core::{FsBackend, Result};
pub use error::{DirectoryError, EntryFailure, Operation};
pub use vfs::{
    AnyBackend, ArchiveBackend, ArchiveEntry, ArchiveIndex, BindOptions, CompressionMethod,
    Directory, DiskBackend, Entry, EntryKind, bind, bind_with,
};
