//! Repository handle and on-disk layout.
//!
//! Every operation in the engine takes an explicit [`Repository`] value
//! instead of reading a process-wide "current repository" from the
//! environment. The handle is created once at program start and
//! threaded through.
//!
//! Layout under the repository directory:
//!
//! ```text
//! .mingit/
//! ├── HEAD              symbolic ref, "ref: refs/heads/master\n"
//! ├── index             binary staging area
//! ├── objects/xx/38...  zlib-compressed loose objects
//! └── refs/heads/...    one file per branch, "<40-hex-id>\n"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// name of the repository directory created inside a working tree
pub const REPO_DIR_NAME: &str = ".mingit";

/// the symbolic ref HEAD points at in a fresh repository
pub const DEFAULT_BRANCH_REF: &str = "refs/heads/master";

/// Handle to an on-disk repository directory.
#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
}

impl Repository {
    /// Open an existing repository directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::RepositoryNotFound(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Create an empty repository under `base`, or reinitialize an
    /// existing one.
    ///
    /// Reinitializing is harmless: directories that exist are kept and
    /// an existing HEAD is left untouched.
    pub fn init(base: impl AsRef<Path>) -> Result<Self> {
        let path = base.as_ref().join(REPO_DIR_NAME);

        for subdir in ["objects", "refs/heads"] {
            fs::create_dir_all(path.join(subdir))?;
        }

        let head = path.join("HEAD");
        if !head.exists() {
            fs::write(&head, format!("ref: {}\n", DEFAULT_BRANCH_REF))?;
        }

        Ok(Self { path })
    }

    /// Find a repository by walking up from `start`.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self> {
        let start = start.as_ref();
        let mut current = start.to_path_buf();

        loop {
            let candidate = current.join(REPO_DIR_NAME);
            if candidate.is_dir() {
                return Self::open(candidate);
            }

            if !current.pop() {
                return Err(Error::RepositoryNotFound(start.to_path_buf()));
            }
        }
    }

    /// the repository directory itself
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// the working tree containing the repository directory
    pub fn working_dir(&self) -> Option<&Path> {
        self.path.parent()
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.path.join("objects")
    }

    pub fn index_file(&self) -> PathBuf {
        self.path.join("index")
    }

    pub fn head_file(&self) -> PathBuf {
        self.path.join("HEAD")
    }

    /// path of a ref file; `name` is a full ref name like
    /// `refs/heads/master`
    pub fn ref_file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}
