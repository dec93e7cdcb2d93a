//! The directory node every pipeline stage works with.
//!
//! A [`Directory`] is bound to one backend location and keeps a lazily populated listing
//! of its direct children. Resolution, size lookups, streams, creation, removal and
//! subtree copies all go through it, so a decoded tree on disk and the entry index of a
//! container are handled by the same code.
//!
//! ### Listing cache
//! - Populated by the first operation that needs it, from a single enumeration of the
//!   backend. Files and subdirectories are both rebuilt from that one pass.
//! - Names are kept in ordered collections: every listing is sorted ascending by byte
//!   value, case-sensitively, which keeps rebuilt containers byte-stable.
//! - Dropped by every mutating call on the node (`open_write`, `create_subdirectory`,
//!   `remove_file`) and by [`Directory::invalidate`]. Child nodes live inside the cache,
//!   so they go with it; use [`Directory::detach`] to keep a handle across mutations.
//! - The file set and the directory map are independent: a container may hold a file
//!   `lib` next to entries below `lib/`, and both are listed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::core::{FsBackend, Result, utils};
use crate::error::{DirectoryError, EntryFailure, Operation};
use crate::vfs::{DiskBackend, EntryKind};

/// A node of a virtual directory tree bound to backend `B`.
///
/// ### Example
/// ```no_run
/// use std::io::Write;
/// use pkgdir_kit::{Directory, DiskBackend};
///
/// let mut root = Directory::new(DiskBackend::new("/tmp/decoded-app").unwrap());
/// for name in root.list_files().unwrap() {
///     println!("{name}: {} bytes", root.file_size(&name).unwrap());
/// }
/// let mut out = root.open_write("res/values/public.xml").unwrap();
/// out.write_all(b"<resources/>").unwrap();
/// ```
#[derive(Debug)]
pub struct Directory<B> {
    backend: B,
    cache: Option<Listing<B>>,
    failures: Vec<EntryFailure>,
}

#[derive(Debug)]
struct Listing<B> {
    files: BTreeSet<String>,
    dirs: BTreeMap<String, Directory<B>>,
}

impl<B: FsBackend> Directory<B> {
    /// Wraps an already validated binding. Nothing is enumerated yet.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: None,
            failures: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }

    /// A new node over the same binding, with an empty cache.
    pub fn detach(&self) -> Self
    where
        B: Clone,
    {
        Self::new(self.backend.clone())
    }

    /// Drops the listing cache. The next listing access enumerates the backend again.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.cache.is_some()
    }

    /// Per-entry failures that did not abort a call on this node: subdirectories left out
    /// of the last listing and files the backend failed to delete.
    pub fn failures(&self) -> &[EntryFailure] {
        &self.failures
    }

    pub fn take_failures(&mut self) -> Vec<EntryFailure> {
        std::mem::take(&mut self.failures)
    }

    /// Names of the files directly inside this directory, sorted ascending.
    pub fn list_files(&mut self) -> Result<Vec<String>> {
        Ok(self.listing()?.files.iter().cloned().collect())
    }

    /// Subdirectories of this directory by name, sorted ascending.
    pub fn list_directories(&mut self) -> Result<&BTreeMap<String, Directory<B>>> {
        Ok(&self.listing()?.dirs)
    }

    /// Every file below this directory as a `/`-separated relative path, sorted ascending.
    pub fn list_files_recursive(&mut self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        self.collect_files("", &mut files)?;
        files.sort();
        Ok(files)
    }

    /// Kind of the entry at `path`, or `None` if there is none.
    ///
    /// A name that is both a file and a directory reports `Directory`.
    pub fn kind_of(&mut self, path: &str) -> Result<Option<EntryKind>> {
        Ok(match self.membership(path)? {
            (_, true) => Some(EntryKind::Directory),
            (true, false) => Some(EntryKind::File),
            (false, false) => None,
        })
    }

    pub fn contains_file(&mut self, path: &str) -> Result<bool> {
        Ok(self.membership(path)?.0)
    }

    pub fn contains_dir(&mut self, path: &str) -> Result<bool> {
        Ok(self.membership(path)?.1)
    }

    /// Walks `path` one segment at a time, each segment naming a subdirectory.
    ///
    /// Fails with `NotADirectory` when a segment names a file, with `NotFound` when it
    /// names nothing. An empty path resolves to `self`.
    pub fn resolve(&mut self, path: &str) -> Result<&mut Self> {
        let mut node = self;
        for segment in utils::segments(path)? {
            node = node.child_dir(segment)?;
        }
        Ok(node)
    }

    /// Raw size of the file at `path`. Fails with `NotAFile` unless it is a file.
    pub fn file_size(&mut self, path: &str) -> Result<u64> {
        let (dir, name) = self.locate(path)?;
        dir.require_file(name, DirectoryError::NotAFile)?;
        dir.backend.file_size(name)
    }

    /// Stored size of the file at `path`. Same contract as [`Directory::file_size`].
    pub fn compressed_size(&mut self, path: &str) -> Result<u64> {
        let (dir, name) = self.locate(path)?;
        dir.require_file(name, DirectoryError::NotAFile)?;
        dir.backend.compressed_size(name)
    }

    pub fn open_read(&mut self, path: &str) -> Result<Box<dyn Read>> {
        let (dir, name) = self.locate(path)?;
        dir.read_entry(name)
    }

    /// Creates or truncates the file at `path`, creating missing parent directories.
    ///
    /// The returned stream must be dropped (or flushed) before the new content is
    /// guaranteed to be visible through the node.
    pub fn open_write(&mut self, path: &str) -> Result<Box<dyn Write>> {
        let (parents, name) = utils::split_parent(path)?;
        let mut dir = self;
        for segment in parents {
            dir = dir.create_child(segment)?;
        }
        dir.write_entry(name)
    }

    /// Creates the subdirectory at `path` (and any missing parents) and returns its node.
    /// Creating a directory that already exists is not an error.
    pub fn create_subdirectory(&mut self, path: &str) -> Result<&mut Self> {
        let segments = utils::segments(path)?;
        if segments.is_empty() {
            return Err(DirectoryError::InvalidPath("empty".into()));
        }
        let mut node = self;
        for segment in segments {
            node = node.create_child(segment)?;
        }
        Ok(node)
    }

    /// Deletes the file at `path`.
    ///
    /// Removal is best effort: a name that is not there is ignored, and a backend failure
    /// is logged and recorded in [`Directory::failures`] of the node holding the file
    /// instead of being returned. Naming a directory fails with `NotAFile`.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        let (dir, name) = self.locate(path)?;
        {
            let listing = dir.listing()?;
            if listing.dirs.contains_key(name) && !listing.files.contains(name) {
                return Err(DirectoryError::NotAFile(dir.entry_location(name)));
            }
        }

        if let Err(error) = dir.backend.remove_file(name) {
            warn!(dir = %dir.location(), name, %error, "file not removed");
            dir.failures.push(EntryFailure {
                name: name.to_string(),
                operation: Operation::Remove,
                error,
            });
        }
        dir.invalidate();
        Ok(())
    }

    /// Copies every file and subdirectory of this node into `dest`, recursively.
    ///
    /// Works across backends. There is no rollback: on failure `dest` keeps whatever was
    /// copied before the failing entry.
    pub fn copy_to<D: FsBackend>(&mut self, dest: &mut Directory<D>) -> Result<()> {
        debug!(from = %self.location(), to = %dest.location(), "copying subtree");

        let (files, dirs) = {
            let listing = self.listing()?;
            let files: Vec<String> = listing.files.iter().cloned().collect();
            let dirs: Vec<String> = listing.dirs.keys().cloned().collect();
            (files, dirs)
        };

        // listed names are used as is, never split again
        for name in &files {
            let input = self.read_entry(name)?;
            let output = dest.write_entry(name)?;
            pipe(input, output, || dest.entry_location(name))?;
        }
        for name in &dirs {
            let target = dest.create_child(name)?;
            self.child_dir(name)?.copy_to(target)?;
        }
        Ok(())
    }

    /// Copies only the files named by `paths` into `dest`, keeping their relative
    /// locations and creating directories in `dest` as needed.
    pub fn copy_files_to<D: FsBackend, S: AsRef<str>>(
        &mut self,
        dest: &mut Directory<D>,
        paths: &[S],
    ) -> Result<()> {
        for path in paths {
            self.copy_file(path.as_ref(), dest)?;
        }
        Ok(())
    }

    /// Copies this subtree into the host directory `host_dir`, creating it if missing.
    pub fn extract_to<P: AsRef<Path>>(&mut self, host_dir: P) -> Result<()> {
        let host_dir = host_dir.as_ref();
        fs::create_dir_all(host_dir)
            .map_err(|e| DirectoryError::io(host_dir.display().to_string(), e))?;
        let mut dest = Directory::new(DiskBackend::new(host_dir)?);
        self.copy_to(&mut dest)
    }

    fn copy_file<D: FsBackend>(&mut self, path: &str, dest: &mut Directory<D>) -> Result<()> {
        let input = self.open_read(path)?;
        let output = dest.open_write(path)?;
        pipe(input, output, || {
            format!("{}/{}", dest.location().trim_end_matches('/'), path)
        })
    }

    /// Opens the file `name` of this node. `name` is a single entry name.
    fn read_entry(&mut self, name: &str) -> Result<Box<dyn Read>> {
        self.require_file(name, DirectoryError::NotFound)?;
        self.backend.open_read(name)
    }

    fn write_entry(&mut self, name: &str) -> Result<Box<dyn Write>> {
        if let Some(listing) = &self.cache {
            if listing.dirs.contains_key(name) && !listing.files.contains(name) {
                return Err(DirectoryError::NotAFile(self.entry_location(name)));
            }
        }

        let stream = self.backend.open_write(name)?;
        self.invalidate();
        Ok(stream)
    }

    fn listing(&mut self) -> Result<&mut Listing<B>> {
        let listing = match self.cache.take() {
            Some(listing) => listing,
            None => self.load()?,
        };
        Ok(self.cache.insert(listing))
    }

    /// One enumeration pass; both name spaces are rebuilt from it.
    fn load(&mut self) -> Result<Listing<B>> {
        let entries = self.backend.enumerate()?;
        self.failures.retain(|f| f.operation != Operation::Listing);

        let mut files = BTreeSet::new();
        let mut dirs = BTreeMap::new();
        for entry in entries {
            match entry.kind() {
                EntryKind::File => {
                    files.insert(entry.name().to_string());
                }
                EntryKind::Directory => match self.backend.child(entry.name()) {
                    Ok(child) => {
                        dirs.insert(entry.name().to_string(), Directory::new(child));
                    }
                    Err(error) => {
                        warn!(dir = %self.location(), name = entry.name(), %error, "subdirectory left out of listing");
                        self.failures.push(EntryFailure {
                            name: entry.name().to_string(),
                            operation: Operation::Listing,
                            error,
                        });
                    }
                },
            }
        }

        debug!(dir = %self.location(), files = files.len(), dirs = dirs.len(), "listing loaded");
        Ok(Listing { files, dirs })
    }

    fn child_dir(&mut self, name: &str) -> Result<&mut Self> {
        let location = self.entry_location(name);
        let listing = self.listing()?;
        if !listing.dirs.contains_key(name) {
            return Err(if listing.files.contains(name) {
                DirectoryError::NotADirectory(location)
            } else {
                DirectoryError::NotFound(location)
            });
        }
        listing
            .dirs
            .get_mut(name)
            .ok_or(DirectoryError::NotFound(location))
    }

    fn create_child(&mut self, name: &str) -> Result<&mut Self> {
        let exists = self
            .cache
            .as_ref()
            .is_some_and(|listing| listing.dirs.contains_key(name));
        if !exists {
            self.backend.create_dir(name)?;
            self.invalidate();
        }
        self.child_dir(name)
    }

    /// Resolves the parent directories of `path` and returns that node with the final name.
    fn locate<'p>(&mut self, path: &'p str) -> Result<(&mut Self, &'p str)> {
        let (parents, name) = utils::split_parent(path)?;
        let mut node = self;
        for segment in parents {
            node = node.child_dir(segment)?;
        }
        Ok((node, name))
    }

    fn require_file(&mut self, name: &str, absent: fn(String) -> DirectoryError) -> Result<()> {
        let location = self.entry_location(name);
        let listing = self.listing()?;
        if listing.files.contains(name) {
            Ok(())
        } else if listing.dirs.contains_key(name) {
            Err(DirectoryError::NotAFile(location))
        } else {
            Err(absent(location))
        }
    }

    /// (in the file set, in the directory set) for `path`; missing parents mean neither.
    fn membership(&mut self, path: &str) -> Result<(bool, bool)> {
        let (dir, name) = match self.locate(path) {
            Ok(found) => found,
            Err(DirectoryError::NotFound(_) | DirectoryError::NotADirectory(_)) => {
                return Ok((false, false));
            }
            Err(e) => return Err(e),
        };
        let listing = dir.listing()?;
        Ok((listing.files.contains(name), listing.dirs.contains_key(name)))
    }

    fn collect_files(&mut self, prefix: &str, out: &mut Vec<String>) -> Result<()> {
        let listing = self.listing()?;
        out.extend(listing.files.iter().map(|name| utils::join(prefix, name)));
        for (name, child) in listing.dirs.iter_mut() {
            child.collect_files(&utils::join(prefix, name), out)?;
        }
        Ok(())
    }

    fn entry_location(&self, name: &str) -> String {
        format!("{}/{}", self.location().trim_end_matches('/'), name)
    }
}

fn pipe(
    mut input: Box<dyn Read>,
    mut output: Box<dyn Write>,
    target: impl Fn() -> String,
) -> Result<()> {
    io::copy(&mut input, &mut output).map_err(|e| DirectoryError::io(target(), e))?;
    output.flush().map_err(|e| DirectoryError::io(target(), e))
}
