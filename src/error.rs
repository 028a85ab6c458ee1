//! Error types for the storage engine.
//!
//! Every failure a storage operation can hit is defined here.
//! We use `thiserror` for ergonomic error definition and better error
//! messages. The engine never prints or exits; it returns these to the
//! caller and lets the command layer decide what to do with them.

use std::path::PathBuf;

use thiserror::Error;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum Error {
    /// the object name is not valid hex, or shorter than 4 characters
    #[error("invalid object name: {0}")]
    InvalidObjectId(String),

    /// no object file matches the given id or prefix
    #[error("object {0} does not exist")]
    ObjectNotFound(String),

    /// more than one object file matches the given prefix
    #[error("ambiguous object name: {0}")]
    AmbiguousObjectId(String),

    /// an object file decompressed or parsed into garbage.
    /// a crash mid-write can leave one of these; callers may treat it
    /// the same as [`Error::ObjectNotFound`]
    #[error("corrupt object: {0}")]
    CorruptObject(String),

    /// the index file does not start with the expected magic tag
    #[error("invalid index file signature")]
    InvalidIndexMagic,

    /// the index file version is not the one supported version
    #[error("unsupported index file version: {0}")]
    UnsupportedIndexVersion(u32),

    /// the packed mode field carries an unknown object-type tag
    #[error("invalid object type: 0b{0:04b}")]
    InvalidObjectType(u32),

    /// the packed mode field carries a tag/permission combination
    /// outside the allowed set
    #[error("invalid permissions: 0o{0:o}")]
    InvalidPermissions(u32),

    /// an index entry sets the extended flag bit
    #[error("index entry extended flag is not supported")]
    UnsupportedIndexExtension,

    /// the recomputed checksum over the index header and entries does
    /// not match the stored trailing checksum
    #[error("index checksum mismatch")]
    BadIndexChecksum,

    /// removal of a path that is not staged
    #[error("path not in index: {0}")]
    PathNotInIndex(String),

    /// the given id resolved to something other than a tree
    #[error("object {0} is not a tree")]
    NotATree(String),

    /// the given id resolved to something other than a commit
    #[error("object {0} is not a commit")]
    NotACommit(String),

    /// a commit object's text body could not be parsed
    #[error("malformed commit object: {0}")]
    MalformedCommit(String),

    /// a tree object's content could not be parsed
    #[error("malformed tree object: {0}")]
    MalformedTree(String),

    /// tree nesting exceeded the recursion bound
    #[error("tree depth limit exceeded")]
    TreeDepthExceeded,

    /// the pack stream does not start with the expected magic tag
    #[error("invalid pack file signature")]
    InvalidPackMagic,

    /// the pack stream version is not version 2
    #[error("unsupported pack file version: {0}")]
    UnsupportedPackVersion(u32),

    /// a packed record carries an unknown or unsupported type tag
    #[error("unsupported packed object type: {0}")]
    UnsupportedPackedObjectType(u8),

    /// a packed record decompressed to a different length than declared
    #[error("invalid object length: expected {expected}, got {actual}")]
    InvalidObjectLength { expected: u64, actual: u64 },

    /// a delta's declared base length disagrees with the actual base
    #[error("invalid base object length: expected {expected}, got {actual}")]
    InvalidBaseObjectLength { expected: u64, actual: u64 },

    /// a fully expanded delta has a different length than declared
    #[error("invalid result object length: expected {expected}, got {actual}")]
    InvalidResultObjectLength { expected: u64, actual: u64 },

    /// a delta copy instruction points outside its source
    #[error("delta copy range out of bounds")]
    InvalidDeltaInstruction,

    /// the pack trailer does not match the hash of the preceding bytes
    #[error("pack checksum mismatch")]
    BadPackChecksum,

    /// the ref name fails validation (reserved characters, traversal)
    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    /// the ref file does not exist
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// a binary decode ran off the end of its buffer
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// a variable-length integer does not fit in 64 bits
    #[error("varint does not fit in 64 bits")]
    InvalidVarint,

    /// no repository directory was found walking up from the start path
    #[error("repository not found, searched from {0}")]
    RepositoryNotFound(PathBuf),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// invalid UTF-8 in decoded text
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ObjectNotFound(_) | Error::RefNotFound(_) | Error::PathNotInIndex(_)
        )
    }

    /// check if this error indicates on-disk corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CorruptObject(_)
                | Error::BadIndexChecksum
                | Error::BadPackChecksum
                | Error::UnexpectedEof
                | Error::InvalidVarint
        )
    }
}

/// result type alias for storage operations
pub type Result<T> = std::result::Result<T, Error>;
