//! fixtures for tests that need a real git repository

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::{tempdir, TempDir};

use crate::oid::Oid;
use crate::repo::Repo;

/// a fresh repository with a local identity and signing disabled
pub(crate) fn init_repo() -> (TempDir, Repo) {
    let dir = tempdir().unwrap();
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["config", "user.name", "tester"]);
    git(dir.path(), &["config", "user.email", "tester@example.com"]);
    git(dir.path(), &["config", "commit.gpgsign", "false"]);
    let repo = Repo::open(dir.path()).unwrap();
    (dir, repo)
}

/// run git in `root`, panicking on failure, returning trimmed stdout
pub(crate) fn git(root: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub(crate) fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub(crate) fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

/// stage everything and commit, returning the new HEAD
pub(crate) fn commit_all(root: &Path, message: &str) -> Oid {
    git(root, &["add", "--all"]);
    git(root, &["commit", "-q", "-m", message]);
    git(root, &["rev-parse", "HEAD"]).parse().unwrap()
}
