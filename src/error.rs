use std::path::PathBuf;

/// error type for checkpoint operations
///
/// "checkpoint not found" and "conflict detected" are not errors: they are
/// reported as data in the operation results.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("git repository not found at {0}")]
    NoRepo(PathBuf),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("failed to run git {command}: {source}")]
    GitSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("working tree capture failed: {0}")]
    CaptureFailed(Box<Error>),

    #[error("invalid {what}: {value:?} ({reason})")]
    InvalidName {
        what: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("path outside repository: {0}")]
    PathOutsideRepo(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("unexpected git output: {0}")]
    UnexpectedOutput(String),

    #[error("lock contention on repository")]
    LockContention,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
