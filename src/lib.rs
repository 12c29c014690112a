//! git-checkpoint - named working-tree snapshots for units of work
//!
//! captures the full state of a git working tree (tracked and untracked,
//! non-ignored files) as an ordinary commit, files it under a per-unit ref
//! namespace, and restores it later while detecting files that changed in
//! the meantime.
//!
//! # Core concepts
//!
//! - **Checkpoint**: a commit whose tree is the captured working tree,
//!   reachable from `refs/<prefix>/<workUnitId>/<name>`
//! - **Work unit**: an externally owned id grouping checkpoints
//! - **Baseline**: the reserved `@baseline` ref of a unit, the last state
//!   a create or restore left the working tree in; restore compares
//!   against it to tell safe overwrites from conflicts
//!
//! capturing stages into a scratch index, so the user's index and working
//! tree are never modified by `create`.
//!
//! # Example usage
//!
//! ```no_run
//! use gitcheckpoint::{ops, store::GitStore, types::{CheckpointKind, RestoreOptions}, Repo};
//! use std::path::Path;
//!
//! let repo = Repo::open(Path::new(".")).unwrap();
//! let store = GitStore::new(&repo);
//!
//! let _lock = repo.lock().unwrap();
//! ops::create(&store, repo.config(), "AUTH-001", "before-refactor", CheckpointKind::Manual).unwrap();
//!
//! let result = ops::restore(&store, repo.config(), "AUTH-001", "before-refactor", RestoreOptions::default()).unwrap();
//! if result.conflicts_detected {
//!     println!("left alone: {:?}", result.conflicted_files);
//! }
//! ```

mod config;
mod error;
mod oid;
mod refs;
mod repo;

pub mod ops;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{Error, Result};
pub use oid::Oid;
pub use refs::{baseline_ref, checkpoint_ref, validate_name, validate_work_unit_id, BASELINE_NAME};
pub use repo::{with_lock, Repo, RepoLock};
