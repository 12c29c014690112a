use serde::{Deserialize, Serialize};

/// options for restore
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// skip the dirty check and overwrite conflicting files
    pub force: bool,
}

impl RestoreOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// a strategy offered to the user when the working tree has unrelated changes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChoice {
    pub name: String,
    pub risk_level: RiskLevel,
    pub description: String,
}

impl UserChoice {
    fn new(name: &str, risk_level: RiskLevel, description: &str) -> Self {
        Self {
            name: name.to_string(),
            risk_level,
            description: description.to_string(),
        }
    }

    /// the strategies offered for a dirty working tree, safest first
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                "commit-first",
                RiskLevel::Low,
                "commit the current changes, then restore the checkpoint",
            ),
            Self::new(
                "stash-and-restore",
                RiskLevel::Medium,
                "stash the current changes, restore, then re-apply the stash",
            ),
            Self::new(
                "overwrite",
                RiskLevel::High,
                "restore with force, discarding conflicting local changes",
            ),
        ]
    }
}

/// a file that could not be written
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// outcome of a restore
///
/// a missing checkpoint, conflicts and a dirty working tree are all
/// reported here rather than as errors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    /// every captured file was restored or already matched
    pub success: bool,
    pub not_found: bool,
    pub conflicts_detected: bool,
    /// files diverged from both the checkpoint and the baseline
    pub conflicted_files: Vec<String>,
    pub requires_user_choice: bool,
    pub options: Vec<UserChoice>,
    /// changed files outside the checkpoint that blocked the restore
    pub dirty_files: Vec<String>,
    pub restored_files: Vec<String>,
    pub unchanged_files: Vec<String>,
    pub failed_files: Vec<FileFailure>,
    /// conflicted files left as they were plus files that failed
    pub not_restored: Vec<String>,
}

impl RestoreResult {
    pub fn not_found() -> Self {
        Self {
            not_found: true,
            ..Self::default()
        }
    }

    pub fn needs_choice(dirty_files: Vec<String>) -> Self {
        Self {
            requires_user_choice: true,
            options: UserChoice::defaults(),
            dirty_files,
            ..Self::default()
        }
    }
}
