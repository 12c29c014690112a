//! object store adapter
//!
//! primitive repository operations the checkpoint operations are built on.
//! [`ObjectStore`] is the seam; [`GitStore`] implements it with git plumbing
//! commands against a real repository.

mod git;
mod staging;

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::oid::Oid;

pub use git::GitStore;
pub use staging::Staging;

/// handle to a tree object written by [`ObjectStore::capture_working_tree`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeHandle(pub Oid);

impl TreeHandle {
    pub fn oid(&self) -> Oid {
        self.0
    }
}

/// author/committer identity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// git file mode of a tree entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileMode {
    Regular,
    Executable,
    Symlink,
}

impl FileMode {
    /// parse the octal mode column of `git ls-tree`
    pub fn from_git(mode: &str) -> Option<Self> {
        match mode {
            "100644" | "100664" => Some(FileMode::Regular),
            "100755" => Some(FileMode::Executable),
            "120000" => Some(FileMode::Symlink),
            _ => None,
        }
    }

    pub fn as_git(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
        }
    }
}

/// a file recorded in a commit's tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeFile {
    /// repository-relative path exactly as git stores it, not necessarily utf-8
    pub path: Vec<u8>,
    pub mode: FileMode,
    pub blob: Oid,
}

impl TreeFile {
    /// path for reports and logs; invalid utf-8 is replaced
    pub fn display_path(&self) -> String {
        String::from_utf8_lossy(&self.path).into_owned()
    }
}

/// the parts of a commit object checkpoints care about
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    /// author timestamp (seconds since epoch)
    pub author_time: i64,
    pub message: String,
}

/// state of a path in the index or the working tree, relative to the
/// layer beneath it (index vs HEAD, working tree vs index)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileState {
    Unmodified,
    Added,
    Modified,
    Deleted,
    Untracked,
}

impl FileState {
    /// map one column of a `git status --porcelain` XY code
    pub fn from_status_code(code: u8) -> Self {
        match code {
            b' ' => FileState::Unmodified,
            b'A' => FileState::Added,
            b'D' => FileState::Deleted,
            b'?' => FileState::Untracked,
            // M, T, U (unmerged), R/C when rename detection is on
            _ => FileState::Modified,
        }
    }
}

/// one row of the status matrix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusRow {
    /// raw repository-relative path
    pub path: Vec<u8>,
    /// present in HEAD
    pub tracked: bool,
    /// index relative to HEAD
    pub stage: FileState,
    /// working tree relative to index
    pub workdir: FileState,
}

impl StatusRow {
    /// no staged or unstaged change
    pub fn is_clean(&self) -> bool {
        self.tracked
            && self.stage == FileState::Unmodified
            && self.workdir == FileState::Unmodified
    }

    /// removed from the index or from the working tree
    pub fn is_deleted(&self) -> bool {
        self.stage == FileState::Deleted || self.workdir == FileState::Deleted
    }

    pub fn display_path(&self) -> String {
        String::from_utf8_lossy(&self.path).into_owned()
    }
}

/// primitive repository operations
///
/// side effects are confined to the object database, refs, and (for
/// [`ObjectStore::write_file`]) the single working-tree file named. the
/// primary index is never written.
pub trait ObjectStore {
    /// stage every modified tracked path and every untracked, non-ignored
    /// path and write the result as a tree; the working tree is not touched
    fn capture_working_tree(&self) -> Result<TreeHandle>;

    /// create a commit object for `tree`
    fn commit_tree(
        &self,
        tree: &TreeHandle,
        parents: &[Oid],
        message: &str,
        author: &Signature,
        timestamp_secs: i64,
    ) -> Result<Oid>;

    /// create or repoint a ref
    fn write_ref(&self, path: &str, oid: &Oid) -> Result<()>;

    /// read a ref, `None` if it does not exist
    fn read_ref(&self, path: &str) -> Result<Option<Oid>>;

    /// full names of all refs below `prefix`
    fn list_refs(&self, prefix: &str) -> Result<Vec<String>>;

    /// delete a ref
    fn delete_ref(&self, path: &str) -> Result<()>;

    /// reset the staging index to HEAD (empty when HEAD is unborn),
    /// discarding staged changes without touching working-tree files
    fn reset_index_to_head(&self) -> Result<()>;

    /// repair state left behind by an interrupted operation, returning the
    /// number of leftovers removed
    fn recover_interrupted(&self) -> Result<usize> {
        Ok(0)
    }

    /// every tracked and untracked (non-ignored) path with its state
    fn status_matrix(&self) -> Result<Vec<StatusRow>>;

    /// current HEAD commit, `None` on an unborn branch
    fn head(&self) -> Result<Option<Oid>>;

    /// parse a commit object
    fn read_commit(&self, oid: &Oid) -> Result<CommitInfo>;

    /// all files of a commit's tree, recursively
    fn tree_files(&self, commit: &Oid) -> Result<Vec<TreeFile>>;

    /// read a blob by id
    fn read_blob(&self, blob: &Oid) -> Result<Vec<u8>>;

    /// read the blob at `path` in `commit`, `None` if the path is absent
    ///
    /// paths here and below are raw repository-relative bytes, as listed by
    /// [`ObjectStore::tree_files`] and [`ObjectStore::status_matrix`]
    fn read_blob_at_commit(&self, commit: &Oid, path: &[u8]) -> Result<Option<Vec<u8>>>;

    /// live working-tree bytes at `path` (symlinks yield their target),
    /// `None` if absent
    fn current_file_bytes(&self, path: &[u8]) -> Result<Option<Vec<u8>>>;

    /// replace the working-tree file at `path`
    fn write_file(&self, path: &[u8], content: &[u8], mode: FileMode) -> Result<()>;
}

/// check that `path` is a relative path inside the working tree and not
/// inside the git directory
pub fn validate_repo_path(path: &[u8]) -> Result<PathBuf> {
    let rel = Path::new(OsStr::from_bytes(path));
    let outside = || Error::PathOutsideRepo(String::from_utf8_lossy(path).into_owned());
    if path.is_empty() || path.contains(&0) {
        return Err(outside());
    }

    let mut first = true;
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                if first && part == ".git" {
                    return Err(outside());
                }
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(outside());
            }
        }
        first = false;
    }

    Ok(rel.to_path_buf())
}
