//! This module provides the backend that maps a directory node onto the entry index of a
//! package container.
//!
//! All nodes of one tree share a single [`ArchiveIndex`]; a node is the index plus the
//! name prefix of the directory it stands for (`""` for the root, `"res/values/"` below).
//! Reads decompress the stored bytes, writes are buffered and registered in the index.
//! Writing the index back into a container file is left to the packer.

use std::cell::{RefCell, RefMut};
use std::io::{self, Read, Write};
use std::path::Path;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::DirectoryError;
use crate::core::{FsBackend, Result};
use crate::vfs::Entry;
use crate::vfs::zip_index::{ArchiveIndex, CompressionMethod};

/// A backend bound to one directory inside a container's entry index.
///
/// Cloning is cheap and yields a binding to the same index. The index is shared through
/// `Rc<RefCell<_>>`, so archive trees stay on the thread that created them.
///
/// ### Example:
/// ```no_run
/// use pkgdir_kit::{ArchiveBackend, FsBackend};
///
/// let backend = ArchiveBackend::open("/tmp/app.apk").unwrap();
/// for entry in backend.enumerate().unwrap() {
///     println!("{} {:?} {:?}", entry.name(), entry.size(), entry.compressed_size());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveBackend {
    index: Rc<RefCell<ArchiveIndex>>,
    prefix: String, // "" or a directory name ending with '/'
}

impl ArchiveBackend {
    /// Binds the root of the container at `path`. New entries are deflated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, CompressionMethod::Deflated)
    }

    /// Binds the root of the container at `path`; new entries are stored with `method`.
    pub fn open_with<P: AsRef<Path>>(path: P, method: CompressionMethod) -> Result<Self> {
        Ok(Self::from_index(ArchiveIndex::open(path, method)?))
    }

    /// Binds the root of a new, empty index.
    pub fn in_memory(method: CompressionMethod) -> Self {
        Self::from_index(ArchiveIndex::new(method))
    }

    pub fn from_index(index: ArchiveIndex) -> Self {
        Self {
            index: Rc::new(RefCell::new(index)),
            prefix: String::new(),
        }
    }

    /// The index shared by every node of this tree, for the packer.
    pub fn index(&self) -> Rc<RefCell<ArchiveIndex>> {
        Rc::clone(&self.index)
    }

    /// Name prefix of the bound directory.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Mutable access to the shared index. Fails instead of panicking while a caller
    /// still holds a borrow obtained through [`ArchiveBackend::index`].
    fn index_mut(&self, key: &str) -> Result<RefMut<'_, ArchiveIndex>> {
        self.index.try_borrow_mut().map_err(|_| {
            DirectoryError::io(key, io::Error::other("archive index is borrowed elsewhere"))
        })
    }

    fn entry_sizes(&self, name: &str) -> Result<(u64, u64)> {
        let key = self.key(name);
        let index = self.index.borrow();
        match index.get(&key) {
            Some(entry) => Ok((entry.size(), entry.compressed_size())),
            None if index.has_dir(&format!("{key}/")) => Err(DirectoryError::NotAFile(key)),
            None => Err(DirectoryError::NotFound(key)),
        }
    }
}

impl FsBackend for ArchiveBackend {
    fn location(&self) -> String {
        let index = self.index.borrow();
        match index.container() {
            Some(path) => format!("{}!/{}", path.display(), self.prefix),
            None => format!("<memory>!/{}", self.prefix),
        }
    }

    fn enumerate(&self) -> Result<Vec<Entry>> {
        Ok(self.index.borrow().children(&self.prefix))
    }

    fn child(&self, name: &str) -> Result<Self> {
        let prefix = format!("{}{}/", self.prefix, name);
        if !self.index.borrow().has_dir(&prefix) {
            return Err(DirectoryError::NotADirectory(prefix));
        }
        Ok(Self {
            index: Rc::clone(&self.index),
            prefix,
        })
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(self.entry_sizes(name)?.0)
    }

    fn compressed_size(&self, name: &str) -> Result<u64> {
        Ok(self.entry_sizes(name)?.1)
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Read>> {
        let key = self.key(name);
        trace!(entry = %key, "open for reading");
        self.index.borrow().open_entry(&key)
    }

    /// Registers an empty entry right away and returns a writer that replaces it with the
    /// buffered bytes on every `flush` and when dropped.
    fn open_write(&self, name: &str) -> Result<Box<dyn Write>> {
        let key = self.key(name);
        trace!(entry = %key, "open for writing");
        self.index_mut(&key)?
            .put(&key, &[])
            .map_err(|e| DirectoryError::io(key.as_str(), e))?;
        Ok(Box::new(EntryWriter {
            index: Rc::clone(&self.index),
            key,
            buffer: Vec::new(),
            dirty: false,
        }))
    }

    fn create_dir(&self, name: &str) -> Result<()> {
        let key = self.key(&format!("{name}/"));
        self.index_mut(&key)?.add_dir(&key);
        Ok(())
    }

    fn remove_file(&self, name: &str) -> Result<()> {
        let key = self.key(name);
        self.index_mut(&key)?.remove(&key);
        Ok(())
    }
}

/// Buffers the bytes of one entry and commits them to the shared index.
struct EntryWriter {
    index: Rc<RefCell<ArchiveIndex>>,
    key: String,
    buffer: Vec<u8>,
    dirty: bool,
}

impl EntryWriter {
    fn commit(&mut self) -> io::Result<()> {
        let mut index = self
            .index
            .try_borrow_mut()
            .map_err(|_| io::Error::other("archive index is borrowed elsewhere"))?;
        index.put(&self.key, &self.buffer)?;
        self.dirty = false;
        Ok(())
    }
}

impl Write for EntryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.dirty {
            self.commit()?;
        }
        Ok(())
    }
}

impl Drop for EntryWriter {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.commit() {
                warn!(entry = %self.key, error = %e, "entry bytes lost on close");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_backend() -> ArchiveBackend {
        let mut index = ArchiveIndex::new(CompressionMethod::Deflated);
        index.put("AndroidManifest.xml", b"<manifest/>").unwrap();
        index.put("res/values/strings.xml", b"<resources/>").unwrap();
        index.put("res/layout/main.xml", b"<LinearLayout/>").unwrap();
        index.add_dir("assets/");
        ArchiveBackend::from_index(index)
    }

    fn read_all(backend: &ArchiveBackend, name: &str) -> Vec<u8> {
        let mut content = Vec::new();
        backend
            .open_read(name)
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        content
    }

    mod bindings {
        use super::*;

        #[test]
        fn test_child_of_implicit_directory() -> Result<()> {
            let backend = setup_backend();
            let res = backend.child("res")?;
            assert_eq!(res.prefix(), "res/");
            let values = res.child("values")?;
            assert_eq!(values.prefix(), "res/values/");
            assert_eq!(values.location(), "<memory>!/res/values/");
            Ok(())
        }

        #[test]
        fn test_child_of_marker() -> Result<()> {
            let backend = setup_backend();
            let assets = backend.child("assets")?;
            assert!(assets.enumerate()?.is_empty());
            Ok(())
        }

        #[test]
        fn test_child_of_file_or_missing() {
            let backend = setup_backend();
            assert!(matches!(
                backend.child("AndroidManifest.xml"),
                Err(DirectoryError::NotADirectory(_))
            ));
            assert!(matches!(
                backend.child("lib"),
                Err(DirectoryError::NotADirectory(_))
            ));
        }

        #[test]
        fn test_children_share_index() -> Result<()> {
            let backend = setup_backend();
            let res = backend.child("res")?;
            res.open_write("raw.bin")?.write_all(b"x").unwrap();
            assert!(backend.index().borrow().get("res/raw.bin").is_some());
            Ok(())
        }
    }

    mod enumerate {
        use super::*;

        #[test]
        fn test_enumerate_root() -> Result<()> {
            let backend = setup_backend();
            let names: Vec<_> = backend
                .enumerate()?
                .into_iter()
                .map(|e| e.name().to_string())
                .collect();
            assert_eq!(names, vec!["AndroidManifest.xml", "assets", "res"]);
            Ok(())
        }
    }

    mod sizes {
        use super::*;

        #[test]
        fn test_sizes_tracked_independently() -> Result<()> {
            let backend = ArchiveBackend::in_memory(CompressionMethod::Deflated);
            let data = vec![b'a'; 4096];
            backend.open_write("zeros.bin")?.write_all(&data).unwrap();

            assert_eq!(backend.file_size("zeros.bin")?, 4096);
            assert!(backend.compressed_size("zeros.bin")? < 4096);
            Ok(())
        }

        #[test]
        fn test_stored_sizes_equal() -> Result<()> {
            let backend = ArchiveBackend::in_memory(CompressionMethod::Stored);
            backend.open_write("raw.bin")?.write_all(&[1, 2, 3]).unwrap();
            assert_eq!(backend.file_size("raw.bin")?, 3);
            assert_eq!(backend.compressed_size("raw.bin")?, 3);
            Ok(())
        }

        #[test]
        fn test_size_of_directory_or_missing() {
            let backend = setup_backend();
            assert!(matches!(
                backend.file_size("res"),
                Err(DirectoryError::NotAFile(_))
            ));
            assert!(matches!(
                backend.file_size("nothing"),
                Err(DirectoryError::NotFound(_))
            ));
        }
    }

    mod streams {
        use super::*;

        #[test]
        fn test_read_existing() -> Result<()> {
            let backend = setup_backend();
            let values = backend.child("res")?.child("values")?;
            assert_eq!(read_all(&values, "strings.xml"), b"<resources/>");
            Ok(())
        }

        #[test]
        fn test_open_write_registers_immediately() -> Result<()> {
            let backend = ArchiveBackend::in_memory(CompressionMethod::Deflated);
            let mut out = backend.open_write("new.txt")?;
            assert_eq!(backend.file_size("new.txt")?, 0);

            out.write_all(b"hello").unwrap();
            out.flush().unwrap();
            assert_eq!(backend.file_size("new.txt")?, 5);

            out.write_all(b" world").unwrap();
            drop(out);
            assert_eq!(read_all(&backend, "new.txt"), b"hello world");
            Ok(())
        }

        #[test]
        fn test_open_write_truncates() -> Result<()> {
            let backend = setup_backend();
            backend.open_write("AndroidManifest.xml")?.write_all(b"<m/>").unwrap();
            assert_eq!(read_all(&backend, "AndroidManifest.xml"), b"<m/>");
            Ok(())
        }

        #[test]
        fn test_read_missing() {
            let backend = setup_backend();
            assert!(matches!(
                backend.open_read("missing.txt").err().unwrap(),
                DirectoryError::NotFound(_)
            ));
        }
    }

    mod mutations {
        use super::*;

        #[test]
        fn test_create_dir_idempotent() -> Result<()> {
            let backend = setup_backend();
            backend.create_dir("smali")?;
            backend.create_dir("smali")?;
            let index = backend.index();
            let markers = index
                .borrow()
                .entries()
                .filter(|(name, _)| name.starts_with("smali"))
                .count();
            assert_eq!(markers, 1);
            Ok(())
        }

        #[test]
        fn test_create_existing_implicit_dir_adds_nothing() -> Result<()> {
            let backend = setup_backend();
            let before = backend.index().borrow().len();
            backend.create_dir("res")?;
            assert_eq!(backend.index().borrow().len(), before);
            Ok(())
        }

        #[test]
        fn test_remove_file() -> Result<()> {
            let backend = setup_backend();
            let layout = backend.child("res")?.child("layout")?;
            layout.remove_file("main.xml")?;
            layout.remove_file("main.xml")?;
            assert!(backend.index().borrow().get("res/layout/main.xml").is_none());
            // the now empty directory disappears with its last entry
            assert!(backend.child("res")?.child("layout").is_err());
            Ok(())
        }

        #[test]
        fn test_mutations_while_index_is_borrowed() -> Result<()> {
            let backend = setup_backend();
            let index = backend.index();
            let held = index.borrow();

            assert!(matches!(
                backend.open_write("new.txt").err().unwrap(),
                DirectoryError::Io { .. }
            ));
            assert!(matches!(
                backend.create_dir("smali"),
                Err(DirectoryError::Io { .. })
            ));
            assert!(matches!(
                backend.remove_file("AndroidManifest.xml"),
                Err(DirectoryError::Io { .. })
            ));
            drop(held);

            assert!(backend.index().borrow().get("AndroidManifest.xml").is_some());
            backend.remove_file("AndroidManifest.xml")?;
            assert!(backend.index().borrow().get("AndroidManifest.xml").is_none());
            Ok(())
        }
    }
}
