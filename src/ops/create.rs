use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::refs::{baseline_ref, checkpoint_ref, validate_name, validate_work_unit_id};
use crate::store::{ObjectStore, TreeHandle};
use crate::types::{Checkpoint, CheckpointKind, CheckpointMessage, CheckpointSummary, StatusTransition};

static LAST_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// snapshot the working tree as a named checkpoint of a unit of work
///
/// re-using a name repoints its ref. the working tree and the primary
/// index are left as they were; only refs are written.
pub fn create<S>(
    store: &S,
    config: &Config,
    work_unit_id: &str,
    name: &str,
    kind: CheckpointKind,
) -> Result<Checkpoint>
where
    S: ObjectStore + ?Sized,
{
    validate_work_unit_id(work_unit_id)?;
    validate_name(name)?;

    store.recover_interrupted()?;

    let tree = store.capture_working_tree().map_err(capture_failed)?;

    let message = CheckpointMessage::new(work_unit_id, name, kind, now_millis(), next_sequence());
    let commit = commit_snapshot(store, config, &tree, &message)?;

    // baseline first, so a failed write never publishes a checkpoint whose
    // baseline still points at older content
    store.write_ref(&baseline_ref(&config.ref_prefix, work_unit_id), &commit)?;
    let ref_path = checkpoint_ref(&config.ref_prefix, work_unit_id, name);
    store.write_ref(&ref_path, &commit)?;

    let captured_files: Vec<String> = store
        .tree_files(&commit)?
        .into_iter()
        .map(|f| f.display_path())
        .collect();

    info!(
        work_unit = work_unit_id,
        name,
        kind = %kind,
        commit = %commit.short(),
        files = captured_files.len(),
        "created checkpoint"
    );

    Ok(Checkpoint {
        summary: CheckpointSummary {
            work_unit_id: work_unit_id.to_string(),
            name: name.to_string(),
            kind,
            commit,
            ref_path,
            created_at: message.created_at,
            sequence: message.sequence,
        },
        captured_files,
    })
}

/// checkpoint taken when a unit of work leaves `previous_status`
pub fn create_automatic<S>(store: &S, config: &Config, event: &StatusTransition) -> Result<Checkpoint>
where
    S: ObjectStore + ?Sized,
{
    create(
        store,
        config,
        &event.work_unit_id,
        &event.checkpoint_name(),
        CheckpointKind::Automatic,
    )
}

/// commit a captured tree on top of HEAD with the configured identity
pub(crate) fn commit_snapshot<S>(
    store: &S,
    config: &Config,
    tree: &TreeHandle,
    message: &CheckpointMessage,
) -> Result<Oid>
where
    S: ObjectStore + ?Sized,
{
    let parents: Vec<Oid> = store.head()?.into_iter().collect();
    let secs = (message.created_at / 1000) as i64;
    let commit = store.commit_tree(tree, &parents, &message.encode(), &config.signature(), secs)?;
    debug!(commit = %commit, tree = %tree.oid(), "committed snapshot");
    Ok(commit)
}

fn capture_failed(e: Error) -> Error {
    match e {
        Error::CaptureFailed(_) => e,
        other => Error::CaptureFailed(Box::new(other)),
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// strictly increasing within the process, close to nanoseconds since epoch
pub(crate) fn next_sequence() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut last = LAST_SEQUENCE.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_SEQUENCE.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CommitInfo, FileMode, GitStore, Signature, StatusRow, TreeFile};
    use crate::test_support::{commit_all, git, init_repo, read, write};
    use std::fs;

    /// git store that fails capturing, or writing refs containing a marker
    struct FaultyStore<'r> {
        inner: GitStore<'r>,
        fail_capture: bool,
        fail_ref: Option<&'static str>,
    }

    impl ObjectStore for FaultyStore<'_> {
        fn capture_working_tree(&self) -> Result<TreeHandle> {
            if self.fail_capture {
                return Err(Error::UnexpectedOutput("disk full".to_string()));
            }
            self.inner.capture_working_tree()
        }

        fn commit_tree(
            &self,
            tree: &TreeHandle,
            parents: &[Oid],
            message: &str,
            author: &Signature,
            timestamp_secs: i64,
        ) -> Result<Oid> {
            self.inner.commit_tree(tree, parents, message, author, timestamp_secs)
        }

        fn write_ref(&self, path: &str, oid: &Oid) -> Result<()> {
            match self.fail_ref {
                Some(marker) if path.contains(marker) => {
                    Err(Error::UnexpectedOutput(format!("cannot lock {}", path)))
                }
                _ => self.inner.write_ref(path, oid),
            }
        }

        fn read_ref(&self, path: &str) -> Result<Option<Oid>> {
            self.inner.read_ref(path)
        }

        fn list_refs(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list_refs(prefix)
        }

        fn delete_ref(&self, path: &str) -> Result<()> {
            self.inner.delete_ref(path)
        }

        fn reset_index_to_head(&self) -> Result<()> {
            self.inner.reset_index_to_head()
        }

        fn status_matrix(&self) -> Result<Vec<StatusRow>> {
            self.inner.status_matrix()
        }

        fn head(&self) -> Result<Option<Oid>> {
            self.inner.head()
        }

        fn read_commit(&self, oid: &Oid) -> Result<CommitInfo> {
            self.inner.read_commit(oid)
        }

        fn tree_files(&self, commit: &Oid) -> Result<Vec<TreeFile>> {
            self.inner.tree_files(commit)
        }

        fn read_blob(&self, blob: &Oid) -> Result<Vec<u8>> {
            self.inner.read_blob(blob)
        }

        fn read_blob_at_commit(&self, commit: &Oid, path: &[u8]) -> Result<Option<Vec<u8>>> {
            self.inner.read_blob_at_commit(commit, path)
        }

        fn current_file_bytes(&self, path: &[u8]) -> Result<Option<Vec<u8>>> {
            self.inner.current_file_bytes(path)
        }

        fn write_file(&self, path: &[u8], content: &[u8], mode: FileMode) -> Result<()> {
            self.inner.write_file(path, content, mode)
        }
    }

    #[test]
    fn test_create_checkpoint() {
        let (dir, repo) = init_repo();
        write(dir.path(), "a.txt", "v1");
        let head = commit_all(dir.path(), "initial");
        write(dir.path(), "b.txt", "untracked");

        let store = GitStore::new(&repo);
        let cp = create(&store, repo.config(), "AUTH-001", "baseline", CheckpointKind::Manual).unwrap();

        assert_eq!(cp.ref_path(), "refs/checkpoints/AUTH-001/baseline");
        assert_eq!(cp.kind(), CheckpointKind::Manual);
        assert_eq!(cp.captured_files, vec!["a.txt", "b.txt"]);

        let info = store.read_commit(&cp.commit()).unwrap();
        assert_eq!(info.parents, vec![head]);
        assert_eq!(info.author_time, (cp.summary.created_at / 1000) as i64);
        assert!(info
            .message
            .starts_with(&format!("checkpoint:AUTH-001:baseline:{}\n", cp.summary.created_at)));

        assert_eq!(
            store.read_ref("refs/checkpoints/AUTH-001/@baseline").unwrap(),
            Some(cp.commit())
        );
    }

    #[test]
    fn test_create_leaves_index_and_worktree_alone() {
        let (dir, repo) = init_repo();
        write(dir.path(), "a.txt", "v1");
        write(dir.path(), "b.txt", "v1");
        commit_all(dir.path(), "initial");
        write(dir.path(), "a.txt", "staged");
        git(dir.path(), &["add", "a.txt"]);
        write(dir.path(), "b.txt", "unstaged");
        write(dir.path(), "c.txt", "untracked");

        let status_before = git(dir.path(), &["--no-optional-locks", "status", "--porcelain"]);
        let index_before = fs::read(repo.index_path()).unwrap();

        let store = GitStore::new(&repo);
        create(&store, repo.config(), "WU-1", "mixed", CheckpointKind::Manual).unwrap();

        assert_eq!(fs::read(repo.index_path()).unwrap(), index_before);
        assert_eq!(
            git(dir.path(), &["--no-optional-locks", "status", "--porcelain"]),
            status_before
        );
        assert_eq!(read(dir.path(), "a.txt"), "staged");
        assert_eq!(read(dir.path(), "b.txt"), "unstaged");
        assert_eq!(read(dir.path(), "c.txt"), "untracked");
    }

    #[test]
    fn test_create_in_empty_repository() {
        let (_dir, repo) = init_repo();
        let store = GitStore::new(&repo);

        let cp = create(&store, repo.config(), "WU-1", "empty", CheckpointKind::Manual).unwrap();
        assert!(cp.captured_files.is_empty());
        assert!(store.read_commit(&cp.commit()).unwrap().parents.is_empty());
    }

    #[test]
    fn test_recreate_repoints_ref() {
        let (dir, repo) = init_repo();
        write(dir.path(), "a.txt", "v1");
        let store = GitStore::new(&repo);

        let first = create(&store, repo.config(), "WU-1", "same", CheckpointKind::Manual).unwrap();
        write(dir.path(), "a.txt", "v2");
        let second = create(&store, repo.config(), "WU-1", "same", CheckpointKind::Manual).unwrap();

        assert_ne!(first.commit(), second.commit());
        assert_eq!(
            store.read_ref(second.ref_path()).unwrap(),
            Some(second.commit())
        );
        assert!(second.summary.sequence > first.summary.sequence);
    }

    #[test]
    fn test_create_automatic() {
        let (dir, repo) = init_repo();
        write(dir.path(), "a.txt", "v1");
        let store = GitStore::new(&repo);

        let event = StatusTransition::new("AUTH-001", "implementing");
        let cp = create_automatic(&store, repo.config(), &event).unwrap();

        assert_eq!(cp.name(), "AUTH-001-auto-implementing");
        assert_eq!(cp.kind(), CheckpointKind::Automatic);
        let info = store.read_commit(&cp.commit()).unwrap();
        assert!(info.message.contains("Checkpoint-Kind: automatic"));
    }

    #[test]
    fn test_create_rejects_invalid_names() {
        let (_dir, repo) = init_repo();
        let store = GitStore::new(&repo);

        for (unit, name) in [("WU:1", "ok"), ("WU-1", "has space"), ("WU-1", "@baseline")] {
            let result = create(&store, repo.config(), unit, name, CheckpointKind::Manual);
            assert!(matches!(result, Err(Error::InvalidName { .. })));
        }
        assert!(store.list_refs("refs/checkpoints").unwrap().is_empty());
    }

    #[test]
    fn test_create_recovers_stale_index() {
        let (dir, repo) = init_repo();
        write(dir.path(), "a.txt", "v1");
        let stale = repo.git_dir().join("checkpoint-index-deadbeef");
        fs::write(&stale, b"junk").unwrap();

        let store = GitStore::new(&repo);
        create(&store, repo.config(), "WU-1", "after-crash", CheckpointKind::Manual).unwrap();

        assert!(!stale.exists());
    }

    #[test]
    fn test_sequence_strictly_increases() {
        let a = next_sequence();
        let b = next_sequence();
        let c = next_sequence();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_create_capture_failure_writes_no_refs() {
        let (dir, repo) = init_repo();
        write(dir.path(), "a.txt", "v1");
        let store = FaultyStore {
            inner: GitStore::new(&repo),
            fail_capture: true,
            fail_ref: None,
        };

        let result = create(&store, repo.config(), "WU-1", "base", CheckpointKind::Manual);

        assert!(matches!(result, Err(Error::CaptureFailed(_))));
        assert!(store.list_refs("refs/checkpoints").unwrap().is_empty());
    }

    #[test]
    fn test_create_baseline_failure_publishes_no_checkpoint() {
        let (dir, repo) = init_repo();
        write(dir.path(), "a.txt", "v1");
        let store = FaultyStore {
            inner: GitStore::new(&repo),
            fail_capture: false,
            fail_ref: Some("@baseline"),
        };

        let result = create(&store, repo.config(), "WU-1", "base", CheckpointKind::Manual);

        assert!(matches!(result, Err(Error::UnexpectedOutput(_))));
        assert!(store.list_refs("refs/checkpoints").unwrap().is_empty());
    }
}
