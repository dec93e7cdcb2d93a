//! The entry index of a package container.
//!
//! Only the index is read when a container is opened: names, methods, sizes and the
//! offset of each entry's stored bytes. The bytes themselves are read from the container
//! file when a stream is opened. Entries written later live in memory until an external
//! packer flushes the index to a new container.
//!
//! The container layout is the ZIP format (local headers, central directory, end of
//! central directory record). ZIP64 and encrypted entries are not supported.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use tracing::{debug, warn};

use crate::DirectoryError;
use crate::core::{Result, utils};
use crate::vfs::Entry;

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const EOCD_LEN: u64 = 22;
const LOCAL_HEADER_LEN: u64 = 30;
const MAX_COMMENT_LEN: u64 = 0xFFFF;
const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_UTF8: u16 = 0x0800;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    /// Any other ZIP method code. Listed and sized, but cannot be read.
    Other(u16),
}

impl From<u16> for CompressionMethod {
    fn from(code: u16) -> Self {
        match code {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            other => CompressionMethod::Other(other),
        }
    }
}

impl CompressionMethod {
    pub fn code(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone)]
enum Payload {
    /// Stored bytes start at this offset of the container file.
    Container { offset: u64 },
    /// Stored bytes written through the index.
    Memory(Rc<[u8]>),
}

/// Index metadata of one entry.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    method: CompressionMethod,
    size: u64,
    compressed_size: u64,
    crc32: u32,
    payload: Payload,
}

impl ArchiveEntry {
    fn marker() -> Self {
        ArchiveEntry {
            method: CompressionMethod::Stored,
            size: 0,
            compressed_size: 0,
            crc32: 0,
            payload: Payload::Memory(Rc::from(Vec::new())),
        }
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// True if the stored bytes are still in the container file.
    pub fn is_in_container(&self) -> bool {
        matches!(self.payload, Payload::Container { .. })
    }

    /// The stored (possibly compressed) bytes, if they were written through the index.
    pub fn stored_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Memory(bytes) => Some(bytes),
            Payload::Container { .. } => None,
        }
    }
}

/// All entries of one container, keyed by their full `/`-separated name.
///
/// Directory markers are keyed with a trailing `/`. The map is ordered, so every listing
/// derived from it is sorted and all names below a prefix are contiguous.
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    entries: BTreeMap<String, ArchiveEntry>,
    container: Option<PathBuf>,
    method: CompressionMethod, // applied to entries written through the index
}

impl ArchiveIndex {
    /// Creates an empty index. New entries are stored with `method`.
    pub fn new(method: CompressionMethod) -> Self {
        Self {
            entries: BTreeMap::new(),
            container: None,
            method,
        }
    }

    /// Reads the index of the container at `path`.
    pub fn open<P: AsRef<Path>>(path: P, method: CompressionMethod) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| DirectoryError::io(path.display().to_string(), e))?;
        let mut reader = BufReader::new(file);
        let entries = read_central_directory(&mut reader)?;
        debug!(container = %path.display(), entries = entries.len(), "read container index");
        Ok(Self {
            entries,
            container: Some(path.to_path_buf()),
            method,
        })
    }

    pub fn container(&self) -> Option<&Path> {
        self.container.as_deref()
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry in name order, directory markers included.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ArchiveEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ArchiveEntry> {
        self.entries.remove(name)
    }

    /// True if `prefix` (ending with `/`) is a directory: an explicit marker or the parent
    /// of at least one entry. The empty prefix is the root and always exists.
    pub fn has_dir(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return true;
        }
        self.below(prefix).next().is_some()
    }

    /// Registers a directory marker for `prefix` unless the directory already exists.
    pub fn add_dir(&mut self, prefix: &str) {
        if !self.has_dir(prefix) {
            self.entries.insert(prefix.to_string(), ArchiveEntry::marker());
        }
    }

    /// Direct children of the directory `prefix`, sorted by name.
    ///
    /// Subdirectories without a marker are synthesized from deeper names. A name that is
    /// both a file and a directory yields one entry of each kind.
    pub fn children(&self, prefix: &str) -> Vec<Entry> {
        let mut files = Vec::new();
        let mut dirs: Vec<&str> = Vec::new();
        for (key, entry) in self.below(prefix) {
            let rest = &key[prefix.len()..];
            match rest.split_once('/') {
                Some((dir, _)) => dirs.push(dir),
                None if rest.is_empty() => {}
                None => files.push(Entry::file(rest, entry.size, entry.compressed_size)),
            }
        }
        // "a.b/x" sorts before "a/x" as a key but after "a" as a name
        dirs.sort_unstable();
        dirs.dedup();

        let mut children = files;
        children.extend(dirs.into_iter().map(Entry::dir));
        children.sort_by(|a, b| a.name().cmp(b.name()));
        children
    }

    /// Replaces the entry `name` with `data`, compressed with the index method.
    pub fn put(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        let mut crc = flate2::Crc::new();
        crc.update(data);

        let (method, stored) = match self.method {
            CompressionMethod::Deflated => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                (CompressionMethod::Deflated, encoder.finish()?)
            }
            _ => (CompressionMethod::Stored, data.to_vec()),
        };

        self.entries.insert(
            name.to_string(),
            ArchiveEntry {
                method,
                size: data.len() as u64,
                compressed_size: stored.len() as u64,
                crc32: crc.sum(),
                payload: Payload::Memory(Rc::from(stored)),
            },
        );
        Ok(())
    }

    /// Opens a decompressing stream over the stored bytes of `name`.
    pub fn open_entry(&self, name: &str) -> Result<Box<dyn Read>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))?;

        let stored: Box<dyn Read> = match &entry.payload {
            Payload::Memory(bytes) => Box::new(Cursor::new(Rc::clone(bytes))),
            Payload::Container { offset } => {
                let path = self.container.as_ref().ok_or_else(|| {
                    DirectoryError::MalformedArchive(format!("'{name}' refers to a missing container"))
                })?;
                let mut file = File::open(path).map_err(|e| DirectoryError::io(name, e))?;
                file.seek(SeekFrom::Start(*offset))
                    .map_err(|e| DirectoryError::io(name, e))?;
                Box::new(file.take(entry.compressed_size))
            }
        };

        match entry.method {
            CompressionMethod::Stored => Ok(stored),
            CompressionMethod::Deflated => Ok(Box::new(DeflateDecoder::new(stored))),
            CompressionMethod::Other(code) => Err(DirectoryError::io(
                name,
                io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("compression method {code} is not supported"),
                ),
            )),
        }
    }

    fn below<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a String, &'a ArchiveEntry)> {
        self.entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(key, _)| key.starts_with(prefix))
    }
}

impl Default for ArchiveIndex {
    fn default() -> Self {
        Self::new(CompressionMethod::Deflated)
    }
}

fn malformed(what: &str) -> impl FnOnce(io::Error) -> DirectoryError + '_ {
    move |e| DirectoryError::MalformedArchive(format!("{what}: {e}"))
}

/// Reads every record of the central directory and locates each entry's stored bytes.
fn read_central_directory<R: Read + Seek>(reader: &mut R) -> Result<BTreeMap<String, ArchiveEntry>> {
    let (count, cd_size, cd_offset) = read_end_record(reader)?;

    reader
        .seek(SeekFrom::Start(cd_offset))
        .map_err(malformed("central directory offset"))?;
    let mut central = vec![0u8; cd_size as usize];
    reader
        .read_exact(&mut central)
        .map_err(malformed("central directory"))?;
    let mut cursor = Cursor::new(central);

    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let record = read_central_record(&mut cursor)?;

        if record.flags & FLAG_ENCRYPTED != 0 {
            warn!(name = %record.name, "skipping encrypted entry");
            continue;
        }
        let Some(key) = normalize_name(&record.name) else {
            warn!(name = %record.name, "skipping entry with unusable name");
            continue;
        };

        let offset = data_offset(reader, record.local_offset)?;
        let entry = ArchiveEntry {
            method: CompressionMethod::from(record.method),
            size: record.size,
            compressed_size: record.compressed_size,
            crc32: record.crc32,
            payload: Payload::Container { offset },
        };
        if entries.insert(key, entry).is_some() {
            debug!(name = %record.name, "duplicate entry, keeping the last one");
        }
    }
    Ok(entries)
}

/// Returns (entry count, central directory size, central directory offset).
fn read_end_record<R: Read + Seek>(reader: &mut R) -> Result<(u16, u32, u64)> {
    let len = reader
        .seek(SeekFrom::End(0))
        .map_err(malformed("container length"))?;
    if len < EOCD_LEN {
        return Err(DirectoryError::MalformedArchive("container too short".into()));
    }

    let tail_len = len.min(EOCD_LEN + MAX_COMMENT_LEN);
    reader
        .seek(SeekFrom::Start(len - tail_len))
        .map_err(malformed("end record"))?;
    let mut tail = vec![0u8; tail_len as usize];
    reader.read_exact(&mut tail).map_err(malformed("end record"))?;

    let signature = EOCD_SIGNATURE.to_le_bytes();
    let pos = (0..=tail.len() - EOCD_LEN as usize)
        .rev()
        .find(|&i| tail[i..i + 4] == signature)
        .ok_or_else(|| DirectoryError::MalformedArchive("end of central directory not found".into()))?;

    let mut record = Cursor::new(&tail[pos + 4..]);
    let read = |r: &mut Cursor<&[u8]>| -> io::Result<(u16, u32, u32)> {
        let _disk = r.read_u16::<LittleEndian>()?;
        let _cd_disk = r.read_u16::<LittleEndian>()?;
        let _disk_entries = r.read_u16::<LittleEndian>()?;
        let total = r.read_u16::<LittleEndian>()?;
        let size = r.read_u32::<LittleEndian>()?;
        let offset = r.read_u32::<LittleEndian>()?;
        Ok((total, size, offset))
    };
    let (total, size, offset) = read(&mut record).map_err(malformed("end record"))?;

    if total == u16::MAX || offset == u32::MAX || size == u32::MAX {
        return Err(DirectoryError::MalformedArchive(
            "ZIP64 containers are not supported".into(),
        ));
    }
    if offset as u64 + size as u64 > len {
        return Err(DirectoryError::MalformedArchive(
            "central directory lies outside the container".into(),
        ));
    }
    Ok((total, size, offset as u64))
}

struct CentralRecord {
    name: String,
    flags: u16,
    method: u16,
    crc32: u32,
    compressed_size: u64,
    size: u64,
    local_offset: u64,
}

fn read_central_record(cursor: &mut Cursor<Vec<u8>>) -> Result<CentralRecord> {
    let read = |r: &mut Cursor<Vec<u8>>| -> io::Result<Option<CentralRecord>> {
        if r.read_u32::<LittleEndian>()? != CENTRAL_HEADER_SIGNATURE {
            return Ok(None);
        }
        let _made_by = r.read_u16::<LittleEndian>()?;
        let _needed = r.read_u16::<LittleEndian>()?;
        let flags = r.read_u16::<LittleEndian>()?;
        let method = r.read_u16::<LittleEndian>()?;
        let _time = r.read_u16::<LittleEndian>()?;
        let _date = r.read_u16::<LittleEndian>()?;
        let crc32 = r.read_u32::<LittleEndian>()?;
        let compressed_size = r.read_u32::<LittleEndian>()?;
        let size = r.read_u32::<LittleEndian>()?;
        let name_len = r.read_u16::<LittleEndian>()?;
        let extra_len = r.read_u16::<LittleEndian>()?;
        let comment_len = r.read_u16::<LittleEndian>()?;
        let _disk_start = r.read_u16::<LittleEndian>()?;
        let _internal_attrs = r.read_u16::<LittleEndian>()?;
        let _external_attrs = r.read_u32::<LittleEndian>()?;
        let local_offset = r.read_u32::<LittleEndian>()?;

        let mut raw_name = vec![0u8; name_len as usize];
        r.read_exact(&mut raw_name)?;
        r.seek(SeekFrom::Current(extra_len as i64 + comment_len as i64))?;

        let name = match String::from_utf8(raw_name) {
            Ok(name) => name,
            Err(e) => {
                if flags & FLAG_UTF8 != 0 {
                    warn!("entry name flagged UTF-8 is not valid UTF-8");
                }
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        Ok(Some(CentralRecord {
            name,
            flags,
            method,
            crc32,
            compressed_size: compressed_size as u64,
            size: size as u64,
            local_offset: local_offset as u64,
        }))
    };

    let record = read(cursor)
        .map_err(malformed("central directory record"))?
        .ok_or_else(|| DirectoryError::MalformedArchive("bad central directory signature".into()))?;
    if record.size == u32::MAX as u64
        || record.compressed_size == u32::MAX as u64
        || record.local_offset == u32::MAX as u64
    {
        return Err(DirectoryError::MalformedArchive(format!(
            "'{}' needs ZIP64 extensions",
            record.name
        )));
    }
    Ok(record)
}

/// Offset of the stored bytes that follow the local header at `local_offset`.
fn data_offset<R: Read + Seek>(reader: &mut R, local_offset: u64) -> Result<u64> {
    reader
        .seek(SeekFrom::Start(local_offset))
        .map_err(malformed("local header offset"))?;
    let read = |r: &mut R| -> io::Result<Option<(u16, u16)>> {
        let mut header = [0u8; LOCAL_HEADER_LEN as usize];
        r.read_exact(&mut header)?;
        let mut fields = Cursor::new(&header[..]);
        if fields.read_u32::<LittleEndian>()? != LOCAL_HEADER_SIGNATURE {
            return Ok(None);
        }
        fields.seek(SeekFrom::Start(26))?;
        let name_len = fields.read_u16::<LittleEndian>()?;
        let extra_len = fields.read_u16::<LittleEndian>()?;
        Ok(Some((name_len, extra_len)))
    };
    let (name_len, extra_len) = read(reader)
        .map_err(malformed("local header"))?
        .ok_or_else(|| DirectoryError::MalformedArchive("bad local header signature".into()))?;
    Ok(local_offset + LOCAL_HEADER_LEN + name_len as u64 + extra_len as u64)
}

/// Canonical key of a container name: `/`-separated, no empty or `.` segments, a trailing
/// `/` for directory markers. Names that would climb out of the tree are unusable.
fn normalize_name(raw: &str) -> Option<String> {
    // some packers write DOS separators
    let slashed = raw.replace('\\', "/");
    let segments = utils::segments(&slashed).ok()?;
    if segments.is_empty() {
        return None;
    }
    let mut key = segments.join("/");
    if raw.ends_with('/') || raw.ends_with('\\') {
        key.push('/');
    }
    Some(key)
}
