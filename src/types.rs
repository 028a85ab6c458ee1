//! Core type-safe wrappers shared by every format in the engine.
//!
//! Ids, object kinds and index entry kinds are all small closed types
//! so the compiler keeps us from mixing them up or passing a raw string
//! where a validated id is expected.

use std::fmt;

use crate::error::{Error, Result};

/// length of a raw object id in bytes
pub const OBJECT_ID_LEN: usize = 20;

/// length of an object id rendered as hex
pub const OBJECT_ID_HEX_LEN: usize = 40;

/// A SHA-1 object id.
///
/// This is the sole key for content-addressed lookup. The inner bytes
/// are only constructed through [`ObjectId::from_bytes`] or a validated
/// hex parse, so an `ObjectId` in hand is always well formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// wrap a raw 20-byte digest
    pub fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// parse an id from a full 40-character hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != OBJECT_ID_HEX_LEN {
            return Err(Error::InvalidObjectId(hex.to_string()));
        }

        let decoded = hex::decode(hex).map_err(|_| Error::InvalidObjectId(hex.to_string()))?;

        let mut bytes = [0u8; OBJECT_ID_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// raw digest bytes
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// render as 40 lowercase hex characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// short form of the id (first 7 hex characters)
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The persisted object kinds.
///
/// `Tag` is recognized so packed tag objects can be decoded, but the
/// engine itself only ever builds blobs, trees and commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    /// the kind keyword used in object headers
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }

    /// parse a kind keyword from an object header
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "blob" => Some(ObjectKind::Blob),
            "tree" => Some(ObjectKind::Tree),
            "commit" => Some(ObjectKind::Commit),
            "tag" => Some(ObjectKind::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The object-type tag packed into the high bits of an index entry's
/// mode field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EntryKind {
    /// a regular file, permissions 0o644 or 0o755
    Regular = 0b1000,
    /// a symbolic link, permissions always 0
    Symlink = 0b1010,
    /// a commit in a linked repository, permissions always 0
    Gitlink = 0b1110,
}

impl EntryKind {
    /// decode the 4-bit tag from a mode field
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0b1000 => Ok(EntryKind::Regular),
            0b1010 => Ok(EntryKind::Symlink),
            0b1110 => Ok(EntryKind::Gitlink),
            _ => Err(Error::InvalidObjectType(tag)),
        }
    }

    /// the 4-bit tag stored in the mode field
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// check a tag/permission combination against the allowed set
    pub fn validate_perms(self, perms: u32) -> Result<()> {
        let ok = match self {
            EntryKind::Regular => perms == 0o644 || perms == 0o755,
            EntryKind::Symlink | EntryKind::Gitlink => perms == 0,
        };

        if ok {
            Ok(())
        } else {
            Err(Error::InvalidPermissions(perms))
        }
    }

    /// the ASCII mode string used inside tree objects
    pub fn tree_mode(self, perms: u32) -> String {
        match self {
            EntryKind::Regular => format!("100{:03o}", perms),
            EntryKind::Symlink => "120000".to_string(),
            EntryKind::Gitlink => "160000".to_string(),
        }
    }

    /// parse a tree-object mode string back into a tag and permissions
    pub fn from_tree_mode(mode: &str) -> Result<(Self, u32)> {
        match mode {
            "100644" => Ok((EntryKind::Regular, 0o644)),
            "100755" => Ok((EntryKind::Regular, 0o755)),
            "120000" => Ok((EntryKind::Symlink, 0)),
            "160000" => Ok((EntryKind::Gitlink, 0)),
            _ => Err(Error::MalformedTree(format!("unsupported mode {}", mode))),
        }
    }
}
