use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};
use crate::store::Signature;

/// checkpoint configuration stored in `<git-dir>/checkpoint.toml`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ref namespace below `refs/`
    pub ref_prefix: String,
    /// synthetic author identity for checkpoint commits
    pub author_name: String,
    pub author_email: String,
    /// git executable
    pub git_binary: String,
    /// default retention for `cleanup`
    pub keep_last: usize,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// load config from file, falling back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// author identity used for checkpoint commits
    pub fn signature(&self) -> Signature {
        Signature::new(&self.author_name, &self.author_email)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ref_prefix: "checkpoints".to_string(),
            author_name: "git-checkpoint".to_string(),
            author_email: "checkpoint@localhost".to_string(),
            git_binary: "git".to_string(),
            keep_last: 10,
        }
    }
}
