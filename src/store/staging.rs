use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, IoResultExt, Result};
use crate::oid::Oid;
use crate::store::{GitStore, ObjectStore};

/// file name prefix of scratch index files inside the git directory
pub(crate) const SCRATCH_PREFIX: &str = "checkpoint-index-";

/// a scratch staging index, discarded when dropped
///
/// all staging for a capture happens here instead of in the primary index,
/// so the user's staged state is never modified. the scratch index is reset
/// to HEAD when the scope begins and removed on every exit path, success or
/// error.
pub struct Staging<'s, 'r> {
    store: &'s GitStore<'r>,
}

impl<'s, 'r> Staging<'s, 'r> {
    /// open a staging scope seeded from HEAD
    pub fn begin(store: &'s GitStore<'r>) -> Result<Self> {
        let staging = Self { store };
        // on failure `staging` is dropped here and the partial index removed
        store.reset_index_to_head()?;
        Ok(staging)
    }

    /// path of the scratch index
    pub fn index_path(&self) -> &Path {
        self.store.staging_index()
    }

    /// stage modified tracked and untracked, non-ignored paths
    pub fn stage_all(&self) -> Result<()> {
        self.store
            .run_staged(&["add", "--all"])
            .map(|_| ())
            .map_err(|e| Error::CaptureFailed(Box::new(e)))
    }

    /// write the staged state as a tree object
    pub fn write_tree(&self) -> Result<Oid> {
        let out = self.store.run_staged(&["write-tree"])?;
        String::from_utf8_lossy(&out).parse()
    }
}

impl Drop for Staging<'_, '_> {
    fn drop(&mut self) {
        let index = self.store.staging_index();
        discard_index(index);
        debug!(index = %index.display(), "discarded staging index");
    }
}

/// remove an index file and the lock git may have left next to it
fn discard_index(index: &Path) {
    for path in [index.to_path_buf(), lock_file_for(index)] {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staging index"),
        }
    }
}

fn lock_file_for(index: &Path) -> PathBuf {
    let mut name = index.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// remove scratch indexes left by interrupted captures, except `keep`
pub(crate) fn remove_stale(git_dir: &Path, keep: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(git_dir).with_path(git_dir)? {
        let entry = entry.with_path(git_dir)?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(SCRATCH_PREFIX) || name.ends_with(".lock") {
            continue;
        }
        let path = entry.path();
        if path == keep {
            continue;
        }
        warn!(path = %path.display(), "removing staging index left by an interrupted capture");
        discard_index(&path);
        removed += 1;
    }
    Ok(removed)
}
