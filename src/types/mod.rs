mod checkpoint;
pub mod message;
mod restore;

pub use checkpoint::{
    Checkpoint, CheckpointKind, CheckpointSummary, CleanupReport, StatusTransition,
};
pub use message::{CheckpointMessage, MessageError};
pub use restore::{FileFailure, RestoreOptions, RestoreResult, RiskLevel, UserChoice};
