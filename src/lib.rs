//! mingit - a content-addressable version control storage engine
//!
//! This crate implements the on-disk storage layer of a git-style
//! version control system: zlib-compressed loose objects addressed by
//! the SHA-1 of their serialized form, a binary staging index, tree
//! and commit objects built from it, named refs, and a decoder for
//! packed object streams.
//!
//! # Example
//!
//! ```no_run
//! use mingit::commit::{local_now, write_commit, Identity};
//! use mingit::index::{Index, IndexEntry};
//! use mingit::object::{store_object, Object};
//! use mingit::repository::Repository;
//! use mingit::types::ObjectKind;
//!
//! let repo = Repository::init(".").unwrap();
//!
//! let blob = Object::new(ObjectKind::Blob, b"hello\n".to_vec());
//! let id = store_object(&repo, &blob).unwrap();
//!
//! let mut index = Index::read(&repo).unwrap();
//! index.add(IndexEntry::from_cacheinfo("100644", id, "hello.txt").unwrap());
//! index.write(&repo).unwrap();
//!
//! let author = Identity::new("Alice", "alice@example.com");
//! write_commit(&repo, "initial commit", &author, local_now()).unwrap();
//! ```

pub mod codec;
pub mod commit;
pub mod error;
pub mod index;
pub mod object;
pub mod pack;
pub mod refs;
pub mod repository;
pub mod tree;
pub mod types;

pub use error::{Error, Result};
pub use repository::Repository;
pub use types::{ObjectId, ObjectKind};
