//! The content-addressable object store.
//!
//! Objects are immutable typed byte blobs. An object's id is the SHA-1
//! of its `"<kind> <size>\0"` header followed by its content, so two
//! objects with the same kind and content always collide to the same id
//! and deduplication is implicit.
//!
//! On disk an object lives at `objects/<first 2 hex chars>/<remaining
//! 38>`, zlib-compressed. Existence of the file is existence of the
//! object; store is a no-op when the file is already there.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::types::{ObjectId, ObjectKind, OBJECT_ID_HEX_LEN};

/// shortest object-id prefix accepted by [`load_object`]
pub const MIN_PREFIX_LEN: usize = 4;

/// An immutable typed byte blob.
///
/// `size` is the length declared in the header. [`load_object`] does
/// not verify it against the actual content length; callers that need
/// that guarantee should compare `content.len()` themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub kind: ObjectKind,
    pub size: u64,
    pub content: Vec<u8>,
}

impl Object {
    /// create an object whose declared size matches its content
    pub fn new(kind: ObjectKind, content: Vec<u8>) -> Self {
        Self {
            kind,
            size: content.len() as u64,
            content,
        }
    }

    /// the `"<kind> <size>\0"` header prepended before hashing and
    /// compression
    pub fn header(&self) -> Vec<u8> {
        format!("{} {}\0", self.kind, self.size).into_bytes()
    }

    /// content-addressed identity: SHA-1 over header plus content
    pub fn id(&self) -> ObjectId {
        let mut hasher = Sha1::new();
        hasher.update(self.header());
        hasher.update(&self.content);
        ObjectId::from_bytes(hasher.finalize().into())
    }
}

fn object_path(repo: &Repository, hex: &str) -> PathBuf {
    let (dirname, filename) = hex.split_at(2);
    repo.objects_dir().join(dirname).join(filename)
}

/// Store an object, returning its id.
///
/// Idempotent: storing an id that already exists on disk is a no-op,
/// since content addressing guarantees identical bytes.
pub fn store_object(repo: &Repository, obj: &Object) -> Result<ObjectId> {
    let id = obj.id();
    let path = object_path(repo, &id.to_hex());

    if !path.exists() {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&obj.header())?;
        encoder.write_all(&obj.content)?;
        fs::write(path, encoder.finish()?)?;
    }

    Ok(id)
}

/// Resolve a full id or an unambiguous prefix to an object file path.
fn find_object_path(repo: &Repository, rev: &str) -> Result<PathBuf> {
    let (dirname, filepart) = rev.split_at(2);
    let dirpath = repo.objects_dir().join(dirname);
    if !dirpath.is_dir() {
        return Err(Error::ObjectNotFound(rev.to_string()));
    }

    let mut matches = Vec::new();
    for entry in fs::read_dir(dirpath)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(filepart) {
            matches.push(entry.path());
        }
    }

    match matches.len() {
        0 => Err(Error::ObjectNotFound(rev.to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::AmbiguousObjectId(rev.to_string())),
    }
}

/// Load an object by full 40-hex-character id or unambiguous prefix of
/// at least 4 hex characters.
pub fn load_object(repo: &Repository, rev: &str) -> Result<Object> {
    let rev = rev.to_ascii_lowercase();
    if rev.len() < MIN_PREFIX_LEN
        || rev.len() > OBJECT_ID_HEX_LEN
        || !rev.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return Err(Error::InvalidObjectId(rev));
    }

    let path = find_object_path(repo, &rev)?;
    let compressed = fs::read(path)?;

    let mut data = Vec::new();
    ZlibDecoder::new(&compressed[..])
        .read_to_end(&mut data)
        .map_err(|_| Error::CorruptObject(rev.clone()))?;

    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::CorruptObject(rev.clone()))?;
    let header = String::from_utf8(data[..nul].to_vec())
        .map_err(|_| Error::CorruptObject(rev.clone()))?;
    let content = data[nul + 1..].to_vec();

    let (kind, size) = header
        .split_once(' ')
        .ok_or_else(|| Error::CorruptObject(rev.clone()))?;
    let kind = ObjectKind::from_name(kind).ok_or_else(|| Error::CorruptObject(rev.clone()))?;
    let size: u64 = size.parse().map_err(|_| Error::CorruptObject(rev.clone()))?;

    Ok(Object {
        kind,
        size,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FIXTURE_ID: &str = "d670460b4b4aece5915caf5c68d12f560a9fe3e4";

    fn test_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_object_id_fixture() {
        // canonical fixture for object-id computation
        let obj = Object::new(ObjectKind::Blob, b"test content\n".to_vec());
        assert_eq!(obj.size, 13);
        assert_eq!(obj.header(), b"blob 13\0");
        assert_eq!(obj.id().to_hex(), FIXTURE_ID);
    }

    #[test]
    fn test_store_load_roundtrip() {
        let (_dir, repo) = test_repo();

        let obj = Object::new(ObjectKind::Blob, b"test content\n".to_vec());
        let id = store_object(&repo, &obj).unwrap();
        assert_eq!(id.to_hex(), FIXTURE_ID);

        let loaded = load_object(&repo, &id.to_hex()).unwrap();
        assert_eq!(loaded.kind, ObjectKind::Blob);
        assert_eq!(loaded.size, 13);
        assert_eq!(loaded.content, b"test content\n");
    }

    #[test]
    fn test_store_is_idempotent() {
        let (_dir, repo) = test_repo();
        let obj = Object::new(ObjectKind::Blob, b"same bytes".to_vec());

        let first = store_object(&repo, &obj).unwrap();
        let second = store_object(&repo, &obj).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_by_prefix() {
        let (_dir, repo) = test_repo();
        let obj = Object::new(ObjectKind::Blob, b"test content\n".to_vec());
        store_object(&repo, &obj).unwrap();

        let loaded = load_object(&repo, &FIXTURE_ID[..8]).unwrap();
        assert_eq!(loaded.content, b"test content\n");

        // uppercase input is folded to lowercase before lookup
        let loaded = load_object(&repo, &FIXTURE_ID[..8].to_uppercase()).unwrap();
        assert_eq!(loaded.content, b"test content\n");
    }

    #[test]
    fn test_load_missing() {
        let (_dir, repo) = test_repo();
        let result = load_object(&repo, &"0".repeat(40));
        assert!(matches!(result, Err(Error::ObjectNotFound(_))));
    }

    #[test]
    fn test_load_invalid_names() {
        let (_dir, repo) = test_repo();

        // shorter than the 4-character minimum
        assert!(matches!(
            load_object(&repo, "d67"),
            Err(Error::InvalidObjectId(_))
        ));
        // not hex at all
        assert!(matches!(
            load_object(&repo, "wxyz"),
            Err(Error::InvalidObjectId(_))
        ));
        // longer than a full id
        assert!(matches!(
            load_object(&repo, &"a".repeat(41)),
            Err(Error::InvalidObjectId(_))
        ));
    }

    #[test]
    fn test_load_ambiguous_prefix() {
        let (_dir, repo) = test_repo();

        // two object files sharing the prefix ab/cd
        let shard = repo.objects_dir().join("ab");
        fs::create_dir_all(&shard).unwrap();
        fs::write(shard.join(format!("cd{}", "1".repeat(36))), b"x").unwrap();
        fs::write(shard.join(format!("cd{}", "2".repeat(36))), b"x").unwrap();

        let result = load_object(&repo, "abcd");
        assert!(matches!(result, Err(Error::AmbiguousObjectId(_))));
    }

    #[test]
    fn test_load_corrupt_object() {
        let (_dir, repo) = test_repo();

        let shard = repo.objects_dir().join("ab");
        fs::create_dir_all(&shard).unwrap();
        fs::write(shard.join("cd".repeat(19)), b"not zlib data").unwrap();

        let result = load_object(&repo, "abcd");
        assert!(matches!(result, Err(Error::CorruptObject(_))));
    }
}
