//! The staging area: an ordered table of per-path entries, serialized
//! to a checksummed binary file.
//!
//! # File format
//!
//! A 12-byte header (`DIRC` magic, big-endian u32 version = 2,
//! big-endian u32 entry count), then one fixed-layout record per entry:
//! six u32 timestamp/device/inode fields, a u32 packed mode, u32 uid,
//! u32 gid, u32 size, the raw 20-byte object id, a u16 flags field
//! whose low 12 bits are the path length, then the NUL-terminated path
//! padded to an 8-byte boundary. Entry padding is relative to the end
//! of the header, which is why the entry section gets its own cursor.
//! The final 20 bytes are a SHA-1 checksum over everything preceding
//! them.
//!
//! Entries are kept in strictly increasing path order at all times;
//! this makes tree construction deterministic and re-serialization
//! byte-identical.

use std::fs;

use sha1::{Digest, Sha1};

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::types::{EntryKind, ObjectId};

/// magic tag at the start of the index file
pub const INDEX_MAGIC: &[u8; 4] = b"DIRC";

/// the one supported index format version
pub const INDEX_VERSION: u32 = 2;

const HEADER_LEN: usize = 12;
const CHECKSUM_LEN: usize = 20;

/// One staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime_s: u32,
    pub ctime_n: u32,
    pub mtime_s: u32,
    pub mtime_n: u32,
    pub dev: u32,
    pub ino: u32,
    pub kind: EntryKind,
    pub perms: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub object_id: ObjectId,
    pub path: String,
}

impl IndexEntry {
    /// create an entry with zeroed stat fields, validating the
    /// kind/permission combination
    pub fn new(
        kind: EntryKind,
        perms: u32,
        object_id: ObjectId,
        path: impl Into<String>,
    ) -> Result<Self> {
        kind.validate_perms(perms)?;

        Ok(Self {
            ctime_s: 0,
            ctime_n: 0,
            mtime_s: 0,
            mtime_n: 0,
            dev: 0,
            ino: 0,
            kind,
            perms,
            uid: 0,
            gid: 0,
            size: 0,
            object_id,
            path: path.into(),
        })
    }

    /// create an entry from a tree-object mode string like `100644`
    pub fn from_cacheinfo(
        mode: &str,
        object_id: ObjectId,
        path: impl Into<String>,
    ) -> Result<Self> {
        let (kind, perms) = EntryKind::from_tree_mode(mode)?;
        Self::new(kind, perms, object_id, path)
    }

    /// the ASCII mode string this entry gets inside a tree object
    pub fn tree_mode(&self) -> String {
        self.kind.tree_mode(self.perms)
    }

    fn packed_mode(&self) -> u32 {
        (self.kind.tag() << 12) | self.perms
    }
}

/// The staging area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Insert or replace by path, keeping strict path order.
    ///
    /// Inserting a duplicate path overwrites the prior entry.
    pub fn add(&mut self, entry: IndexEntry) {
        match self
            .entries
            .binary_search_by(|e| e.path.cmp(&entry.path))
        {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Delete an entry by path.
    pub fn remove(&mut self, path: &str) -> Result<IndexEntry> {
        match self.entries.binary_search_by(|e| e.path.as_str().cmp(path)) {
            Ok(i) => Ok(self.entries.remove(i)),
            Err(_) => Err(Error::PathNotInIndex(path.to_string())),
        }
    }

    /// Read the index file, returning an empty index when the file is
    /// absent (nothing staged is not an error).
    pub fn read(repo: &Repository) -> Result<Self> {
        let path = repo.index_file();
        if !path.exists() {
            return Ok(Self::new());
        }

        Self::parse(&fs::read(path)?)
    }

    /// Serialize and rewrite the index file.
    pub fn write(&self, repo: &Repository) -> Result<()> {
        fs::write(repo.index_file(), self.serialize())?;
        Ok(())
    }

    /// Parse an index file image.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(Error::UnexpectedEof);
        }

        let mut header = ByteReader::new(&data[..HEADER_LEN]);
        if header.read(4)? != INDEX_MAGIC {
            return Err(Error::InvalidIndexMagic);
        }

        let version = header.read_u32()?;
        if version != INDEX_VERSION {
            return Err(Error::UnsupportedIndexVersion(version));
        }

        let num_entries = header.read_u32()?;

        // the trailing checksum covers header and entries, extensions
        // included
        let body_end = data.len() - CHECKSUM_LEN;
        let stored = &data[body_end..];
        let computed = Sha1::digest(&data[..body_end]);
        if stored != computed.as_slice() {
            return Err(Error::BadIndexChecksum);
        }

        // entry padding is relative to the end of the 12-byte header
        let mut reader = ByteReader::padded(&data[HEADER_LEN..body_end]);
        let mut index = Self::new();

        for _ in 0..num_entries {
            index.add(Self::parse_entry(&mut reader)?);
        }

        // anything left before the checksum is extension data; skipped
        Ok(index)
    }

    fn parse_entry(reader: &mut ByteReader<'_>) -> Result<IndexEntry> {
        let ctime_s = reader.read_u32()?;
        let ctime_n = reader.read_u32()?;
        let mtime_s = reader.read_u32()?;
        let mtime_n = reader.read_u32()?;
        let dev = reader.read_u32()?;
        let ino = reader.read_u32()?;

        let mode = reader.read_u32()?;
        let kind = EntryKind::from_tag((mode >> 12) & 0xf)?;
        let perms = mode & 0x1ff;
        kind.validate_perms(perms)?;

        let uid = reader.read_u32()?;
        let gid = reader.read_u32()?;
        let size = reader.read_u32()?;
        let object_id = reader.read_sha1()?;

        let flags = reader.read_u16()?;
        let extended = (flags >> 14) & 0b1;
        if extended != 0 {
            return Err(Error::UnsupportedIndexExtension);
        }

        let path = reader.read_cstring()?;

        Ok(IndexEntry {
            ctime_s,
            ctime_n,
            mtime_s,
            mtime_n,
            dev,
            ino,
            kind,
            perms,
            uid,
            gid,
            size,
            object_id,
            path,
        })
    }

    /// Serialize to the on-disk image.
    ///
    /// Byte-stable: repeated calls over the same logical content yield
    /// identical bytes, padding included.
    pub fn serialize(&self) -> Vec<u8> {
        let mut header = ByteWriter::new();
        header.write(INDEX_MAGIC);
        header.write_u32(INDEX_VERSION);
        header.write_u32(self.entries.len() as u32);

        let mut body = ByteWriter::padded();
        for entry in &self.entries {
            body.write_u32(entry.ctime_s);
            body.write_u32(entry.ctime_n);
            body.write_u32(entry.mtime_s);
            body.write_u32(entry.mtime_n);
            body.write_u32(entry.dev);
            body.write_u32(entry.ino);
            body.write_u32(entry.packed_mode());
            body.write_u32(entry.uid);
            body.write_u32(entry.gid);
            body.write_u32(entry.size);
            body.write_sha1(&entry.object_id);
            body.write_u16(entry.path.len().min(0xfff) as u16);
            body.write_cstring(&entry.path);
        }

        let mut data = header.into_bytes();
        data.extend_from_slice(body.as_slice());

        let digest = Sha1::digest(&data);
        data.extend_from_slice(&digest);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(path: &str) -> IndexEntry {
        let id = ObjectId::from_hex("d670460b4b4aece5915caf5c68d12f560a9fe3e4").unwrap();
        IndexEntry::new(EntryKind::Regular, 0o644, id, path).unwrap()
    }

    fn sample_index() -> Index {
        let mut index = Index::new();
        index.add(entry("src/main.rs"));
        index.add(entry("README.md"));
        index.add(entry("src/lib.rs"));
        index
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let index = Index::read(&repo).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_add_keeps_path_order() {
        let index = sample_index();
        let paths: Vec<&str> = index.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["README.md", "src/lib.rs", "src/main.rs"]);
    }

    #[test]
    fn test_add_duplicate_path_overwrites() {
        let mut index = sample_index();

        let mut replacement = entry("src/main.rs");
        replacement.size = 99;
        index.add(replacement);

        assert_eq!(index.len(), 3);
        assert_eq!(index.get("src/main.rs").unwrap().size, 99);
    }

    #[test]
    fn test_remove() {
        let mut index = sample_index();
        let removed = index.remove("src/lib.rs").unwrap();
        assert_eq!(removed.path, "src/lib.rs");
        assert_eq!(index.len(), 2);

        let result = index.remove("src/lib.rs");
        assert!(matches!(result, Err(Error::PathNotInIndex(_))));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let index = sample_index();
        index.write(&repo).unwrap();

        let loaded = Index::read(&repo).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_serialization_is_byte_stable() {
        let index = sample_index();
        assert_eq!(index.serialize(), index.serialize());

        let reparsed = Index::parse(&index.serialize()).unwrap();
        assert_eq!(reparsed.serialize(), index.serialize());
    }

    #[test]
    fn test_corrupt_entry_byte_fails_checksum() {
        let index = sample_index();
        let mut data = index.serialize();

        // flip one byte inside the entry section
        data[HEADER_LEN + 3] ^= 0xff;

        let result = Index::parse(&data);
        assert!(matches!(result, Err(Error::BadIndexChecksum)));
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = sample_index().serialize();
        data[0] = b'X';
        assert!(matches!(Index::parse(&data), Err(Error::InvalidIndexMagic)));
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = sample_index().serialize();
        // version is checked before the checksum, so patching it is fine
        data[4..8].copy_from_slice(&3u32.to_be_bytes());
        assert!(matches!(
            Index::parse(&data),
            Err(Error::UnsupportedIndexVersion(3))
        ));
    }

    /// build a single-entry index image with an arbitrary raw mode and
    /// a valid trailing checksum
    fn raw_index_with_mode(mode: u32) -> Vec<u8> {
        let mut header = ByteWriter::new();
        header.write(INDEX_MAGIC);
        header.write_u32(INDEX_VERSION);
        header.write_u32(1);

        let mut body = ByteWriter::padded();
        for _ in 0..6 {
            body.write_u32(0);
        }
        body.write_u32(mode);
        for _ in 0..3 {
            body.write_u32(0);
        }
        body.write_sha1(&ObjectId::from_bytes([0u8; 20]));
        body.write_u16(5);
        body.write_cstring("a.txt");

        let mut data = header.into_bytes();
        data.extend_from_slice(body.as_slice());
        let digest = Sha1::digest(&data);
        data.extend_from_slice(&digest);
        data
    }

    #[test]
    fn test_invalid_object_type_tag() {
        let data = raw_index_with_mode(0b0100 << 12);
        assert!(matches!(
            Index::parse(&data),
            Err(Error::InvalidObjectType(_))
        ));
    }

    #[test]
    fn test_invalid_permissions() {
        // regular file with 0o600 is outside the allowed set
        let data = raw_index_with_mode((0b1000 << 12) | 0o600);
        assert!(matches!(
            Index::parse(&data),
            Err(Error::InvalidPermissions(_))
        ));
    }

    #[test]
    fn test_symlink_and_gitlink_roundtrip() {
        let id = ObjectId::from_hex("d670460b4b4aece5915caf5c68d12f560a9fe3e4").unwrap();
        let mut index = Index::new();
        index.add(IndexEntry::new(EntryKind::Symlink, 0, id, "link").unwrap());
        index.add(IndexEntry::new(EntryKind::Gitlink, 0, id, "vendor").unwrap());

        let reparsed = Index::parse(&index.serialize()).unwrap();
        assert_eq!(reparsed, index);
        assert_eq!(reparsed.get("link").unwrap().kind, EntryKind::Symlink);
    }

    #[test]
    fn test_cacheinfo_entry() {
        let id = ObjectId::from_hex("d670460b4b4aece5915caf5c68d12f560a9fe3e4").unwrap();
        let entry = IndexEntry::from_cacheinfo("100755", id, "run.sh").unwrap();
        assert_eq!(entry.kind, EntryKind::Regular);
        assert_eq!(entry.perms, 0o755);
        assert_eq!(entry.tree_mode(), "100755");

        assert!(IndexEntry::from_cacheinfo("777", id, "x").is_err());
    }
}
