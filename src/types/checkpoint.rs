use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::oid::Oid;

/// how a checkpoint came to be
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    /// named by a human, kept until explicitly removed or cleaned up
    Manual,
    /// taken on a work-unit status transition
    Automatic,
}

impl CheckpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointKind::Manual => "manual",
            CheckpointKind::Automatic => "automatic",
        }
    }

    pub fn is_automatic(&self) -> bool {
        matches!(self, CheckpointKind::Automatic)
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(CheckpointKind::Manual),
            "automatic" => Ok(CheckpointKind::Automatic),
            other => Err(format!("unknown checkpoint kind: {}", other)),
        }
    }
}

/// a checkpoint as returned by the registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSummary {
    pub work_unit_id: String,
    pub name: String,
    pub kind: CheckpointKind,
    pub commit: Oid,
    pub ref_path: String,
    /// creation time, milliseconds since epoch
    pub created_at: u64,
    /// tie breaker for checkpoints created within the same millisecond
    pub sequence: u64,
}

/// a checkpoint with the files it captured
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    #[serde(flatten)]
    pub summary: CheckpointSummary,
    /// repository-relative paths in the snapshot tree
    pub captured_files: Vec<String>,
}

impl Checkpoint {
    pub fn work_unit_id(&self) -> &str {
        &self.summary.work_unit_id
    }

    pub fn name(&self) -> &str {
        &self.summary.name
    }

    pub fn kind(&self) -> CheckpointKind {
        self.summary.kind
    }

    pub fn commit(&self) -> Oid {
        self.summary.commit
    }

    pub fn ref_path(&self) -> &str {
        &self.summary.ref_path
    }
}

/// status change of a unit of work, emitted by the work-unit tracker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTransition {
    pub work_unit_id: String,
    pub previous_status: String,
}

impl StatusTransition {
    pub fn new(work_unit_id: impl Into<String>, previous_status: impl Into<String>) -> Self {
        Self {
            work_unit_id: work_unit_id.into(),
            previous_status: previous_status.into(),
        }
    }

    /// `<workUnitId>-auto-<previousStatus>`
    pub fn checkpoint_name(&self) -> String {
        format!("{}-auto-{}", self.work_unit_id, self.previous_status)
    }
}

/// outcome of a retention pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// names whose refs were deleted, oldest last
    pub deleted: Vec<String>,
    /// names kept, newest first
    pub preserved: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!("manual".parse(), Ok(CheckpointKind::Manual));
        assert_eq!("automatic".parse(), Ok(CheckpointKind::Automatic));
        assert!("auto".parse::<CheckpointKind>().is_err());
    }

    #[test]
    fn test_transition_name() {
        let event = StatusTransition::new("AUTH-001", "implementing");
        assert_eq!(event.checkpoint_name(), "AUTH-001-auto-implementing");
    }

    #[test]
    fn test_transition_from_tracker_json() {
        let event: StatusTransition =
            serde_json::from_str(r#"{"workUnitId":"AUTH-001","previousStatus":"testing"}"#)
                .unwrap();
        assert_eq!(event, StatusTransition::new("AUTH-001", "testing"));
    }
}
