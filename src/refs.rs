//! Named pointers to commits.
//!
//! A ref is a single-line text file under the repository directory,
//! `refs/heads/<name>` containing `"<40-hex-id>\n"`. HEAD is a
//! *symbolic* ref: it stores `"ref: <other-ref-name>\n"` and resolves
//! by exactly one level of indirection; chains of symbolic refs are
//! not supported.

use std::fs;

use crate::error::{Error, Result};
use crate::object::load_object;
use crate::repository::Repository;
use crate::types::{ObjectId, ObjectKind};

/// the symbolic ref name
pub const HEAD: &str = "HEAD";

/// characters never allowed anywhere in a ref name
const FORBIDDEN: [char; 7] = [' ', '*', ':', '?', '[', '^', '~'];

/// Manages refs for a repository.
pub struct RefStore;

impl RefStore {
    /// Check a ref name against the path-traversal and
    /// reserved-character guard.
    pub fn is_valid_name(name: &str) -> bool {
        name.starts_with("refs/")
            && !name.ends_with('/')
            && !name.bytes().any(|b| b < 0x20)
            && !name.contains(FORBIDDEN)
            && !name.contains("/.")
            && !name.contains("..")
    }

    fn validate(name: &str) -> Result<()> {
        if Self::is_valid_name(name) {
            Ok(())
        } else {
            Err(Error::InvalidRefName(name.to_string()))
        }
    }

    /// Read the ref name HEAD points at.
    pub fn read_symbolic_ref(repo: &Repository) -> Result<String> {
        let path = repo.head_file();
        if !path.exists() {
            return Err(Error::RefNotFound(HEAD.to_string()));
        }

        let data = fs::read_to_string(path)?;
        let data = data.trim_end_matches('\n');
        if data.lines().count() > 1 {
            return Err(Error::InvalidRefName(data.to_string()));
        }

        let target = data
            .strip_prefix("ref: ")
            .ok_or_else(|| Error::InvalidRefName(data.to_string()))?;
        Self::validate(target)?;

        Ok(target.to_string())
    }

    /// Point HEAD at another ref.
    pub fn write_symbolic_ref(repo: &Repository, target: &str) -> Result<()> {
        Self::validate(target)?;
        fs::write(repo.head_file(), format!("ref: {}\n", target))?;
        Ok(())
    }

    /// Resolve a ref name (or HEAD, through one level of indirection)
    /// to a commit id.
    pub fn resolve(repo: &Repository, name: &str) -> Result<ObjectId> {
        let name = Self::resolve_name(repo, name)?;

        let path = repo.ref_file(&name);
        if !path.exists() {
            return Err(Error::RefNotFound(name));
        }

        let data = fs::read_to_string(path)?;
        ObjectId::from_hex(data.trim())
    }

    /// Update a ref to point at a commit, creating it if needed.
    ///
    /// The target object must exist and be a commit; history stays
    /// append-only because nothing here ever rewrites an object.
    pub fn update(repo: &Repository, name: &str, id: &ObjectId) -> Result<()> {
        let name = Self::resolve_name(repo, name)?;

        let obj = load_object(repo, &id.to_hex())?;
        if obj.kind != ObjectKind::Commit {
            return Err(Error::NotACommit(id.to_hex()));
        }

        let path = repo.ref_file(&name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, format!("{}\n", id))?;

        Ok(())
    }

    /// HEAD resolves through its symbolic target; anything else must
    /// pass validation as-is
    fn resolve_name(repo: &Repository, name: &str) -> Result<String> {
        if name == HEAD {
            Self::read_symbolic_ref(repo)
        } else {
            Self::validate(name)?;
            Ok(name.to_string())
        }
    }
}
