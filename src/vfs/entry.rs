#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One direct child of a bound location, as reported by a backend enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    name: String,
    kind: EntryKind,
    size: Option<u64>,
    compressed_size: Option<u64>,
}

impl Entry {
    pub fn file<S: Into<String>>(name: S, size: u64, compressed_size: u64) -> Entry {
        Entry {
            name: name.into(),
            kind: EntryKind::File,
            size: Some(size),
            compressed_size: Some(compressed_size),
        }
    }

    pub fn dir<S: Into<String>>(name: S) -> Entry {
        Entry {
            name: name.into(),
            kind: EntryKind::Directory,
            size: None,
            compressed_size: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Raw size; `None` for directories.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Stored size; `None` for directories.
    pub fn compressed_size(&self) -> Option<u64> {
        self.compressed_size
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}
