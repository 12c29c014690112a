use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::{self, Permissions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::debug;

use crate::error::{Error, IoResultExt, Result};
use crate::oid::Oid;
use crate::repo::Repo;
use crate::store::staging::{self, Staging, SCRATCH_PREFIX};
use crate::store::{
    validate_repo_path, CommitInfo, FileMode, FileState, ObjectStore, Signature, StatusRow,
    TreeFile, TreeHandle,
};

/// [`ObjectStore`] backed by git plumbing commands
pub struct GitStore<'r> {
    repo: &'r Repo,
    staging_index: PathBuf,
}

impl<'r> GitStore<'r> {
    pub fn new(repo: &'r Repo) -> Self {
        let staging_index = repo
            .git_dir()
            .join(format!("{}{}", SCRATCH_PREFIX, uuid::Uuid::new_v4().simple()));
        Self {
            repo,
            staging_index,
        }
    }

    pub fn repo(&self) -> &Repo {
        self.repo
    }

    /// scratch index used while capturing
    pub fn staging_index(&self) -> &Path {
        &self.staging_index
    }

    /// base git command running in the working tree root
    fn command<A: AsRef<OsStr>>(&self, args: &[A]) -> Command {
        let mut cmd = Command::new(&self.repo.config().git_binary);
        cmd.arg("-C")
            .arg(self.repo.workdir())
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null());
        cmd
    }

    /// run a command and collect its output, whatever the exit status
    fn output<A>(&self, mut cmd: Command, args: &[A], stdin: Option<&[u8]>) -> Result<Output>
    where
        A: AsRef<OsStr> + std::fmt::Debug,
    {
        debug!(args = ?args, "git");
        let label = command_label(args);
        let spawn_err = |source| Error::GitSpawn {
            command: label.clone(),
            source,
        };

        match stdin {
            None => cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).output().map_err(spawn_err),
            Some(input) => {
                let mut child = cmd
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(spawn_err)?;
                if let Some(mut pipe) = child.stdin.take() {
                    pipe.write_all(input).map_err(spawn_err)?;
                }
                child.wait_with_output().map_err(spawn_err)
            }
        }
    }

    /// run a command, failing on a non-zero exit status
    fn checked<A>(&self, cmd: Command, args: &[A], stdin: Option<&[u8]>) -> Result<Vec<u8>>
    where
        A: AsRef<OsStr> + std::fmt::Debug,
    {
        let output = self.output(cmd, args, stdin)?;
        if !output.status.success() {
            return Err(Error::Git {
                command: command_label(args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// run git and return stdout
    pub(crate) fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        self.checked(self.command(args), args, None)
    }

    /// run git with arguments that may not be utf-8, such as raw paths
    fn run_os(&self, args: &[&OsStr]) -> Result<Vec<u8>> {
        self.checked(self.command(args), args, None)
    }

    /// run git against the scratch staging index
    pub(crate) fn run_staged(&self, args: &[&str]) -> Result<Vec<u8>> {
        let mut cmd = self.command(args);
        cmd.env("GIT_INDEX_FILE", &self.staging_index);
        self.checked(cmd, args, None)
    }

    /// `rev-parse --verify` that maps "does not exist" to `None`
    fn verify(&self, rev: &str) -> Result<Option<Oid>> {
        let args = ["rev-parse", "--verify", "--quiet", rev];
        let output = self.output(self.command(&args), &args, None)?;
        if output.status.success() {
            return String::from_utf8_lossy(&output.stdout).parse().map(Some);
        }
        if output.status.code() == Some(1) && output.stdout.is_empty() {
            return Ok(None);
        }
        Err(Error::Git {
            command: command_label(&args),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn full_path(&self, path: &[u8]) -> Result<PathBuf> {
        Ok(self.repo.workdir().join(validate_repo_path(path)?))
    }
}

impl ObjectStore for GitStore<'_> {
    fn capture_working_tree(&self) -> Result<TreeHandle> {
        let staging = Staging::begin(self)?;
        staging.stage_all()?;
        let tree = staging.write_tree()?;
        debug!(tree = %tree, "captured working tree");
        Ok(TreeHandle(tree))
    }

    fn commit_tree(
        &self,
        tree: &TreeHandle,
        parents: &[Oid],
        message: &str,
        author: &Signature,
        timestamp_secs: i64,
    ) -> Result<Oid> {
        let tree_hex = tree.oid().to_hex();
        let parent_hex: Vec<String> = parents.iter().map(Oid::to_hex).collect();

        let mut args = vec!["commit-tree", tree_hex.as_str()];
        for parent in &parent_hex {
            args.push("-p");
            args.push(parent);
        }
        args.extend(["-F", "-"]);

        let date = format!("@{} +0000", timestamp_secs);
        let mut cmd = self.command(&args[..]);
        cmd.env("GIT_AUTHOR_NAME", &author.name)
            .env("GIT_AUTHOR_EMAIL", &author.email)
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_NAME", &author.name)
            .env("GIT_COMMITTER_EMAIL", &author.email)
            .env("GIT_COMMITTER_DATE", &date);

        let out = self.checked(cmd, &args[..], Some(message.as_bytes()))?;
        String::from_utf8_lossy(&out).parse()
    }

    fn write_ref(&self, path: &str, oid: &Oid) -> Result<()> {
        let hex = oid.to_hex();
        let reason = format!("checkpoint: update {}", path);
        self.run(&["update-ref", "-m", &reason, path, &hex])?;
        Ok(())
    }

    fn read_ref(&self, path: &str) -> Result<Option<Oid>> {
        self.verify(&format!("{}^{{commit}}", path))
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_end_matches('/');
        let out = self.run(&["for-each-ref", "--format=%(refname)", prefix])?;
        let mut refs: Vec<String> = String::from_utf8_lossy(&out)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        refs.sort();
        Ok(refs)
    }

    fn delete_ref(&self, path: &str) -> Result<()> {
        self.run(&["update-ref", "-d", path])?;
        Ok(())
    }

    fn reset_index_to_head(&self) -> Result<()> {
        if self.head()?.is_some() {
            self.run_staged(&["read-tree", "HEAD"])?;
        } else {
            self.run_staged(&["read-tree", "--empty"])?;
        }
        Ok(())
    }

    fn recover_interrupted(&self) -> Result<usize> {
        staging::remove_stale(self.repo.git_dir(), &self.staging_index)
    }

    fn status_matrix(&self) -> Result<Vec<StatusRow>> {
        let status = self.run(&[
            "--no-optional-locks",
            "status",
            "--porcelain=v1",
            "-z",
            "--untracked-files=all",
            "--no-renames",
        ])?;

        let mut rows = BTreeMap::new();
        for record in status.split(|b| *b == 0).filter(|r| r.len() > 3) {
            let (x, y) = (record[0], record[1]);
            let path = record[3..].to_vec();
            rows.insert(
                path.clone(),
                StatusRow {
                    path,
                    tracked: x != b'?' && x != b'A',
                    stage: FileState::from_status_code(x),
                    workdir: FileState::from_status_code(y),
                },
            );
        }

        let tracked = self.run(&["--no-optional-locks", "ls-files", "-z"])?;
        for record in tracked.split(|b| *b == 0).filter(|r| !r.is_empty()) {
            let path = record.to_vec();
            rows.entry(path.clone()).or_insert(StatusRow {
                path,
                tracked: true,
                stage: FileState::Unmodified,
                workdir: FileState::Unmodified,
            });
        }

        Ok(rows.into_values().collect())
    }

    fn head(&self) -> Result<Option<Oid>> {
        self.verify("HEAD^{commit}")
    }

    fn read_commit(&self, oid: &Oid) -> Result<CommitInfo> {
        let out = self.run(&["cat-file", "commit", &oid.to_hex()])?;
        parse_commit(&String::from_utf8_lossy(&out))
    }

    fn tree_files(&self, commit: &Oid) -> Result<Vec<TreeFile>> {
        let out = self.run(&["ls-tree", "-r", "-z", "--full-tree", &commit.to_hex()])?;
        let mut files = Vec::new();
        for record in out.split(|b| *b == 0).filter(|r| !r.is_empty()) {
            if let Some(file) = parse_ls_tree_record(record)? {
                files.push(file);
            }
        }
        Ok(files)
    }

    fn read_blob(&self, blob: &Oid) -> Result<Vec<u8>> {
        self.run(&["cat-file", "blob", &blob.to_hex()])
    }

    fn read_blob_at_commit(&self, commit: &Oid, path: &[u8]) -> Result<Option<Vec<u8>>> {
        validate_repo_path(path)?;
        let hex = commit.to_hex();
        let out = self.run_os(&[
            OsStr::new("--literal-pathspecs"),
            OsStr::new("ls-tree"),
            OsStr::new("-z"),
            OsStr::new("--full-tree"),
            OsStr::new(&hex),
            OsStr::new("--"),
            OsStr::from_bytes(path),
        ])?;
        for record in out.split(|b| *b == 0).filter(|r| !r.is_empty()) {
            if let Some(file) = parse_ls_tree_record(record)? {
                if file.path == path {
                    return self.read_blob(&file.blob).map(Some);
                }
            }
        }
        Ok(None)
    }

    fn current_file_bytes(&self, path: &[u8]) -> Result<Option<Vec<u8>>> {
        let full = self.full_path(path)?;
        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io { path: full, source: e }),
        };

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&full).with_path(&full)?;
            Ok(Some(target.as_os_str().as_bytes().to_vec()))
        } else if meta.is_file() {
            fs::read(&full).with_path(&full).map(Some)
        } else {
            Ok(None)
        }
    }

    fn write_file(&self, path: &[u8], content: &[u8], mode: FileMode) -> Result<()> {
        let full = self.full_path(path)?;
        let parent = full
            .parent()
            .ok_or_else(|| Error::PathOutsideRepo(String::from_utf8_lossy(path).into_owned()))?;
        fs::create_dir_all(parent).with_path(parent)?;

        let existing = fs::symlink_metadata(&full).ok();

        if mode == FileMode::Symlink {
            if existing.is_some() {
                fs::remove_file(&full).with_path(&full)?;
            }
            std::os::unix::fs::symlink(OsStr::from_bytes(content), &full).with_path(&full)?;
            return Ok(());
        }

        // keep the user's permission bits, only toggling the executable bits
        let base = existing
            .filter(|m| m.is_file())
            .map(|m| m.permissions().mode() & 0o7777)
            .unwrap_or(0o644);
        let perms = match mode {
            FileMode::Executable => base | 0o111,
            _ => base & !0o111,
        };

        // atomic write: temp sibling -> fsync -> rename
        let file_name = full
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));
        {
            let mut tmp_file = fs::File::create(&tmp_path).with_path(&tmp_path)?;
            tmp_file.write_all(content).with_path(&tmp_path)?;
            tmp_file.sync_all().with_path(&tmp_path)?;
        }
        fs::set_permissions(&tmp_path, Permissions::from_mode(perms)).with_path(&tmp_path)?;

        if let Err(e) = fs::rename(&tmp_path, &full) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Io { path: full, source: e });
        }
        Ok(())
    }
}

/// subcommand name for error messages, skipping leading global options
fn command_label<A: AsRef<OsStr>>(args: &[A]) -> String {
    args.iter()
        .map(|a| a.as_ref().to_string_lossy())
        .find(|a| !a.starts_with('-'))
        .map(|a| a.into_owned())
        .unwrap_or_else(|| "git".to_string())
}

/// parse one `ls-tree -z` record: `<mode> SP <type> SP <oid> TAB <path>`
///
/// the path is kept as raw bytes. submodules and other non-blob entries
/// yield `None`
fn parse_ls_tree_record(record: &[u8]) -> Result<Option<TreeFile>> {
    let unexpected = || Error::UnexpectedOutput(String::from_utf8_lossy(record).into_owned());
    let tab = record
        .iter()
        .position(|b| *b == b'\t')
        .ok_or_else(unexpected)?;
    let meta = std::str::from_utf8(&record[..tab]).map_err(|_| unexpected())?;
    let path = &record[tab + 1..];

    let mut parts = meta.split(' ');
    let (mode, kind, oid) = match (parts.next(), parts.next(), parts.next()) {
        (Some(mode), Some(kind), Some(oid)) => (mode, kind, oid),
        _ => return Err(unexpected()),
    };

    if kind != "blob" {
        return Ok(None);
    }
    let Some(mode) = FileMode::from_git(mode) else {
        return Ok(None);
    };

    Ok(Some(TreeFile {
        path: path.to_vec(),
        mode,
        blob: oid.parse()?,
    }))
}

/// parse the raw text of `git cat-file commit`
fn parse_commit(raw: &str) -> Result<CommitInfo> {
    let (headers, message) = raw.split_once("\n\n").unwrap_or((raw, ""));

    let mut tree: Option<Oid> = None;
    let mut parents: Vec<Oid> = Vec::new();
    let mut author_time: i64 = 0;

    for line in headers.lines() {
        // continuation lines of multi-line headers (gpgsig) start with a space
        if line.starts_with(' ') {
            continue;
        }
        match line.split_once(' ') {
            Some(("tree", oid)) => tree = Some(oid.parse()?),
            Some(("parent", oid)) => parents.push(oid.parse()?),
            Some(("author", ident)) => {
                // "Name <email> 1700000000 +0000"
                author_time = ident
                    .rsplitn(3, ' ')
                    .nth(1)
                    .and_then(|secs| secs.parse().ok())
                    .unwrap_or(0);
            }
            _ => {}
        }
    }

    Ok(CommitInfo {
        tree: tree.ok_or_else(|| Error::UnexpectedOutput("commit without tree".to_string()))?,
        parents,
        author_time,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_all, git, init_repo, read, write};

    fn sig() -> Signature {
        Signature::new("tester", "tester@example.com")
    }

    #[test]
    fn test_parse_commit() {
        let raw = "tree 0123456789abcdef0123456789abcdef01234567\n\
                   parent 1111111111111111111111111111111111111111\n\
                   author A U Thor <a@example.com> 1700000000 +0100\n\
                   committer A U Thor <a@example.com> 1700000001 +0100\n\
                   \n\
                   checkpoint:WU-1:base:1700000000000\n";
        let info = parse_commit(raw).unwrap();
        assert_eq!(info.parents.len(), 1);
        assert_eq!(info.author_time, 1700000000);
        assert_eq!(info.message, "checkpoint:WU-1:base:1700000000000\n");
    }

    #[test]
    fn test_parse_ls_tree_record() {
        let file = parse_ls_tree_record(
            b"100755 blob 0123456789abcdef0123456789abcdef01234567\tbin/run.sh",
        )
        .unwrap()
        .unwrap();
        assert_eq!(file.path, b"bin/run.sh");
        assert_eq!(file.mode, FileMode::Executable);

        let latin1 = parse_ls_tree_record(
            b"100644 blob 0123456789abcdef0123456789abcdef01234567\tcaf\xe9.txt",
        )
        .unwrap()
        .unwrap();
        assert_eq!(latin1.path, b"caf\xe9.txt");
        assert_eq!(latin1.display_path(), "caf\u{FFFD}.txt");

        let submodule = parse_ls_tree_record(
            b"160000 commit 0123456789abcdef0123456789abcdef01234567\tvendor/lib",
        )
        .unwrap();
        assert!(submodule.is_none());
    }

    #[test]
    fn test_capture_includes_untracked_and_modified() {
        let (dir, repo) = init_repo();
        write(dir.path(), "tracked.txt", "v1");
        commit_all(dir.path(), "initial");
        write(dir.path(), "tracked.txt", "v2");
        write(dir.path(), "new/untracked.txt", "fresh");
        write(dir.path(), ".gitignore", "ignored.log\n");
        write(dir.path(), "ignored.log", "noise");

        let store = GitStore::new(&repo);
        let tree = store.capture_working_tree().unwrap();
        let commit = store
            .commit_tree(&tree, &[], "snapshot", &sig(), 1_700_000_000)
            .unwrap();

        let paths: Vec<String> = store
            .tree_files(&commit)
            .unwrap()
            .into_iter()
            .map(|f| f.display_path())
            .collect();
        assert_eq!(paths, vec![".gitignore", "new/untracked.txt", "tracked.txt"]);

        let blob = store.read_blob_at_commit(&commit, b"tracked.txt").unwrap();
        assert_eq!(blob.as_deref(), Some(&b"v2"[..]));
        assert!(store.read_blob_at_commit(&commit, b"ignored.log").unwrap().is_none());
    }

    #[test]
    fn test_capture_does_not_touch_primary_index() {
        let (dir, repo) = init_repo();
        write(dir.path(), "a.txt", "v1");
        commit_all(dir.path(), "initial");
        write(dir.path(), "a.txt", "staged");
        git(dir.path(), &["add", "a.txt"]);
        write(dir.path(), "a.txt", "unstaged");

        let index_before = fs::read(repo.index_path()).unwrap();
        let store = GitStore::new(&repo);
        store.capture_working_tree().unwrap();
        let index_after = fs::read(repo.index_path()).unwrap();

        assert_eq!(index_before, index_after);
        assert_eq!(read(dir.path(), "a.txt"), "unstaged");
        assert!(!store.staging_index().exists());
    }

    #[test]
    fn test_commit_tree_timestamp_and_parent() {
        let (dir, repo) = init_repo();
        write(dir.path(), "a.txt", "v1");
        let head = commit_all(dir.path(), "initial");

        let store = GitStore::new(&repo);
        let tree = store.capture_working_tree().unwrap();
        let oid = store
            .commit_tree(&tree, &[head], "message body\n", &sig(), 1_700_000_123)
            .unwrap();

        let info = store.read_commit(&oid).unwrap();
        assert_eq!(info.tree, tree.oid());
        assert_eq!(info.parents, vec![head]);
        assert_eq!(info.author_time, 1_700_000_123);
        assert_eq!(info.message, "message body\n");
    }

    #[test]
    fn test_refs_lifecycle() {
        let (dir, repo) = init_repo();
        write(dir.path(), "a.txt", "v1");
        let head = commit_all(dir.path(), "initial");
        let store = GitStore::new(&repo);

        assert!(store.read_ref("refs/checkpoints/WU-1/base").unwrap().is_none());

        store.write_ref("refs/checkpoints/WU-1/base", &head).unwrap();
        store.write_ref("refs/checkpoints/WU-1/other", &head).unwrap();
        store.write_ref("refs/checkpoints/WU-10/base", &head).unwrap();

        assert_eq!(
            store.read_ref("refs/checkpoints/WU-1/base").unwrap(),
            Some(head)
        );
        assert_eq!(
            store.list_refs("refs/checkpoints/WU-1/").unwrap(),
            vec![
                "refs/checkpoints/WU-1/base".to_string(),
                "refs/checkpoints/WU-1/other".to_string()
            ]
        );

        store.delete_ref("refs/checkpoints/WU-1/base").unwrap();
        assert!(store.read_ref("refs/checkpoints/WU-1/base").unwrap().is_none());
    }

    #[test]
    fn test_head_unborn() {
        let (_dir, repo) = init_repo();
        let store = GitStore::new(&repo);
        assert!(store.head().unwrap().is_none());
    }

    #[test]
    fn test_status_matrix() {
        let (dir, repo) = init_repo();
        write(dir.path(), "clean.txt", "c");
        write(dir.path(), "changed.txt", "v1");
        write(dir.path(), "gone.txt", "g");
        commit_all(dir.path(), "initial");

        write(dir.path(), "changed.txt", "v2");
        fs::remove_file(dir.path().join("gone.txt")).unwrap();
        write(dir.path(), "fresh.txt", "f");

        let store = GitStore::new(&repo);
        let rows = store.status_matrix().unwrap();
        let row = |p: &str| rows.iter().find(|r| r.path == p.as_bytes()).unwrap().clone();

        assert!(row("clean.txt").is_clean());
        assert_eq!(row("changed.txt").workdir, FileState::Modified);
        assert_eq!(row("gone.txt").workdir, FileState::Deleted);
        assert!(!row("fresh.txt").tracked);
        assert_eq!(row("fresh.txt").workdir, FileState::Untracked);
    }

    #[test]
    fn test_write_and_read_working_file() {
        let (dir, repo) = init_repo();
        let store = GitStore::new(&repo);

        assert!(store.current_file_bytes(b"deep/dir/a.txt").unwrap().is_none());

        store
            .write_file(b"deep/dir/a.txt", b"payload", FileMode::Regular)
            .unwrap();
        assert_eq!(
            store.current_file_bytes(b"deep/dir/a.txt").unwrap().as_deref(),
            Some(&b"payload"[..])
        );

        store
            .write_file(b"run.sh", b"#!/bin/sh\n", FileMode::Executable)
            .unwrap();
        let mode = fs::metadata(dir.path().join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        store.write_file(b"link", b"deep/dir/a.txt", FileMode::Symlink).unwrap();
        assert_eq!(
            store.current_file_bytes(b"link").unwrap().as_deref(),
            Some(&b"deep/dir/a.txt"[..])
        );
    }

    #[test]
    fn test_paths_outside_repo_rejected() {
        let (_dir, repo) = init_repo();
        let store = GitStore::new(&repo);

        assert!(matches!(
            store.current_file_bytes(b"../escape"),
            Err(Error::PathOutsideRepo(_))
        ));
        assert!(matches!(
            store.write_file(b".git/HEAD", b"x", FileMode::Regular),
            Err(Error::PathOutsideRepo(_))
        ));
    }

    #[test]
    fn test_non_utf8_paths_keep_their_bytes() {
        let (dir, repo) = init_repo();
        let name: &[u8] = b"caf\xe9.txt";
        fs::write(dir.path().join(OsStr::from_bytes(name)), "latin-1").unwrap();

        let store = GitStore::new(&repo);
        let rows = store.status_matrix().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, name);

        let tree = store.capture_working_tree().unwrap();
        let commit = store
            .commit_tree(&tree, &[], "snapshot", &sig(), 1_700_000_000)
            .unwrap();
        let files = store.tree_files(&commit).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, name);
        assert_eq!(
            store.read_blob_at_commit(&commit, name).unwrap().as_deref(),
            Some(&b"latin-1"[..])
        );

        store.write_file(name, b"rewritten", FileMode::Regular).unwrap();
        assert_eq!(
            fs::read(dir.path().join(OsStr::from_bytes(name))).unwrap(),
            b"rewritten"
        );
        assert!(!dir.path().join("caf\u{FFFD}.txt").exists());
    }
}
