use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;

use nix::fcntl::{Flock, FlockArg};

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};

/// a git working tree checkpoints are taken from
pub struct Repo {
    workdir: PathBuf,
    git_dir: PathBuf,
    config: Config,
}

impl Repo {
    /// open the repository containing `path`
    ///
    /// loads `<git-dir>/checkpoint.toml` if present.
    pub fn open(path: &Path) -> Result<Self> {
        let (workdir, git_dir) = discover(path, "git")?;
        let config = Config::load_or_default(&git_dir.join("checkpoint.toml"))?;
        Ok(Self {
            workdir,
            git_dir,
            config,
        })
    }

    /// open the repository containing `path` with an explicit configuration
    pub fn open_with_config(path: &Path, config: Config) -> Result<Self> {
        let (workdir, git_dir) = discover(path, &config.git_binary)?;
        Ok(Self {
            workdir,
            git_dir,
            config,
        })
    }

    /// working tree root
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// absolute path of the git directory
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// repository configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// mutable access to configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// save configuration changes
    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.config_path())
    }

    /// path to checkpoint.toml
    pub fn config_path(&self) -> PathBuf {
        self.git_dir.join("checkpoint.toml")
    }

    /// path to the primary index file
    pub fn index_path(&self) -> PathBuf {
        self.git_dir.join("index")
    }

    /// path to lock file
    pub fn lock_path(&self) -> PathBuf {
        self.git_dir.join("checkpoint.lock")
    }

    /// acquire exclusive lock on repository
    ///
    /// checkpoint operations do not lock on their own; callers that may run
    /// concurrently against the same repository hold this guard around every
    /// create and restore.
    pub fn lock(&self) -> Result<RepoLock> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        let flock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
            .map_err(|_| Error::LockContention)?;

        Ok(RepoLock { flock })
    }

    /// try to acquire exclusive lock, returning None if already locked
    pub fn try_lock(&self) -> Result<Option<RepoLock>> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(Some(RepoLock { flock })),
            Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
            Err(_) => Err(Error::LockContention),
        }
    }
}

/// guard that holds repository lock until dropped
pub struct RepoLock {
    #[allow(dead_code)]
    flock: Flock<File>,
}

/// run a function while holding the repository lock
pub fn with_lock<T, F>(repo: &Repo, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let _lock = repo.lock()?;
    f()
}

/// find working tree root and git dir for `path`
fn discover(path: &Path, git: &str) -> Result<(PathBuf, PathBuf)> {
    let output = Command::new(git)
        .arg("-C")
        .arg(path)
        .args(["rev-parse", "--show-toplevel", "--absolute-git-dir"])
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .map_err(|source| Error::GitSpawn {
            command: "rev-parse".to_string(),
            source,
        })?;

    // bare repositories and plain directories both end up here
    if !output.status.success() {
        return Err(Error::NoRepo(path.to_path_buf()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    match (lines.next(), lines.next()) {
        (Some(workdir), Some(git_dir)) if !workdir.is_empty() => {
            Ok((PathBuf::from(workdir), PathBuf::from(git_dir)))
        }
        _ => Err(Error::NoRepo(path.to_path_buf())),
    }
}
