//! checkpoint commit message codec
//!
//! the first line is the stable, colon-delimited header other tools parse:
//!
//! ```text
//! checkpoint:<workUnitId>:<name>:<epochMillis>
//! ```
//!
//! versioned trailers follow after a blank line:
//!
//! ```text
//! Checkpoint-Version: 1
//! Checkpoint-Kind: manual
//! Checkpoint-Sequence: 1700000000000123456
//! ```
//!
//! a message consisting of the header alone is version 0: the kind is
//! inferred from the name and the sequence is 0.

use std::fmt;

use crate::types::CheckpointKind;

pub const HEADER_TAG: &str = "checkpoint";
pub const FORMAT_VERSION: u32 = 1;

const VERSION_TRAILER: &str = "Checkpoint-Version";
const KIND_TRAILER: &str = "Checkpoint-Kind";
const SEQUENCE_TRAILER: &str = "Checkpoint-Sequence";

/// why a commit message was not recognized as a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("missing 'checkpoint:' header")]
    MissingHeader,

    #[error("header has {0} fields, expected 4")]
    FieldCount(usize),

    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid trailer {key}: {value}")]
    Trailer { key: String, value: String },
}

/// metadata stored in a checkpoint commit message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointMessage {
    pub work_unit_id: String,
    pub name: String,
    pub created_at: u64,
    pub kind: CheckpointKind,
    pub sequence: u64,
    pub version: u32,
}

impl CheckpointMessage {
    pub fn new(
        work_unit_id: impl Into<String>,
        name: impl Into<String>,
        kind: CheckpointKind,
        created_at: u64,
        sequence: u64,
    ) -> Self {
        Self {
            work_unit_id: work_unit_id.into(),
            name: name.into(),
            created_at,
            kind,
            sequence,
            version: FORMAT_VERSION,
        }
    }

    /// the stable first line
    pub fn header(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            HEADER_TAG, self.work_unit_id, self.name, self.created_at
        )
    }

    /// full commit message
    pub fn encode(&self) -> String {
        format!(
            "{}\n\n{}: {}\n{}: {}\n{}: {}\n",
            self.header(),
            VERSION_TRAILER,
            FORMAT_VERSION,
            KIND_TRAILER,
            self.kind,
            SEQUENCE_TRAILER,
            self.sequence
        )
    }

    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let mut lines = raw.lines();
        let header = lines.next().unwrap_or("").trim();

        let fields: Vec<&str> = header.split(':').collect();
        if fields.first() != Some(&HEADER_TAG) {
            return Err(MessageError::MissingHeader);
        }
        if fields.len() != 4 {
            return Err(MessageError::FieldCount(fields.len()));
        }
        let (work_unit_id, name) = (fields[1], fields[2]);
        let created_at: u64 = fields[3]
            .parse()
            .map_err(|_| MessageError::Timestamp(fields[3].to_string()))?;

        let mut version: u32 = 0;
        let mut kind: Option<CheckpointKind> = None;
        let mut sequence: u64 = 0;

        for line in lines {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            let invalid = || MessageError::Trailer {
                key: key.to_string(),
                value: value.to_string(),
            };
            match key.trim() {
                VERSION_TRAILER => version = value.parse().map_err(|_| invalid())?,
                KIND_TRAILER => kind = Some(value.parse().map_err(|_| invalid())?),
                SEQUENCE_TRAILER => sequence = value.parse().map_err(|_| invalid())?,
                _ => {}
            }
        }

        if version > FORMAT_VERSION {
            return Err(MessageError::UnsupportedVersion(version));
        }

        let kind = kind.unwrap_or_else(|| infer_kind(work_unit_id, name));

        Ok(Self {
            work_unit_id: work_unit_id.to_string(),
            name: name.to_string(),
            created_at,
            kind,
            sequence,
            version,
        })
    }
}

impl fmt::Display for CheckpointMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// automatic checkpoints are named `<workUnitId>-auto-<previousStatus>`
fn infer_kind(work_unit_id: &str, name: &str) -> CheckpointKind {
    if name.starts_with(&format!("{}-auto-", work_unit_id)) {
        CheckpointKind::Automatic
    } else {
        CheckpointKind::Manual
    }
}
