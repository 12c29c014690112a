use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::oid::Oid;
use crate::ops::create::{commit_snapshot, next_sequence, now_millis};
use crate::refs::{
    baseline_ref, checkpoint_ref, validate_name, validate_work_unit_id, BASELINE_NAME,
};
use crate::store::{ObjectStore, TreeFile};
use crate::types::{CheckpointKind, CheckpointMessage, FileFailure, RestoreOptions, RestoreResult};

/// what happened to one captured file
#[derive(Debug, PartialEq, Eq)]
enum FileOutcome {
    Unchanged,
    Restored,
    /// diverged from both checkpoint and baseline
    Conflict { overwritten: bool },
}

/// bring the working tree back to a checkpoint
///
/// only files recorded in the checkpoint are written. a file is overwritten
/// when it is missing, or when its current content or the checkpoint's
/// content matches the unit's baseline. anything else is a conflict and is
/// left alone unless `force` is set.
pub fn restore<S>(
    store: &S,
    config: &Config,
    work_unit_id: &str,
    name: &str,
    options: RestoreOptions,
) -> Result<RestoreResult>
where
    S: ObjectStore + ?Sized,
{
    validate_work_unit_id(work_unit_id)?;
    validate_name(name)?;

    let ref_path = checkpoint_ref(&config.ref_prefix, work_unit_id, name);
    let Some(target) = store.read_ref(&ref_path)? else {
        info!(work_unit = work_unit_id, name, "checkpoint not found");
        return Ok(RestoreResult::not_found());
    };

    let files = store.tree_files(&target)?;

    if !options.force {
        let captured: HashSet<&[u8]> = files.iter().map(|f| f.path.as_slice()).collect();
        let mut dirty = Vec::new();
        for row in store.status_matrix()? {
            if row.is_clean() || captured.contains(row.path.as_slice()) {
                continue;
            }
            // deleted and not in the checkpoint: already in the checkpoint's state
            if row.is_deleted() && store.current_file_bytes(&row.path)?.is_none() {
                continue;
            }
            dirty.push(row.display_path());
        }
        if !dirty.is_empty() {
            info!(
                work_unit = work_unit_id,
                name,
                dirty = dirty.len(),
                "working tree has unrelated changes"
            );
            return Ok(RestoreResult::needs_choice(dirty));
        }
    }

    let baseline_path = baseline_ref(&config.ref_prefix, work_unit_id);
    let baseline = store.read_ref(&baseline_path)?.unwrap_or(target);

    let mut result = RestoreResult::default();
    for file in &files {
        let path = file.display_path();
        match restore_file(store, &baseline, file, options.force) {
            Ok(FileOutcome::Unchanged) => result.unchanged_files.push(path),
            Ok(FileOutcome::Restored) => result.restored_files.push(path),
            Ok(FileOutcome::Conflict { overwritten }) => {
                result.conflicted_files.push(path.clone());
                if overwritten {
                    result.restored_files.push(path);
                } else {
                    result.not_restored.push(path);
                }
            }
            Err(e) => {
                warn!(path = %path, error = %e, "failed to restore file");
                result.failed_files.push(FileFailure {
                    path: path.clone(),
                    error: e.to_string(),
                });
                result.not_restored.push(path);
            }
        }
    }

    result.conflicts_detected = !result.conflicted_files.is_empty();
    result.success = result.not_restored.is_empty();

    if result.success {
        rebaseline(store, config, work_unit_id, &baseline_path)?;
    }

    info!(
        work_unit = work_unit_id,
        name,
        restored = result.restored_files.len(),
        unchanged = result.unchanged_files.len(),
        conflicts = result.conflicted_files.len(),
        failed = result.failed_files.len(),
        "restored checkpoint"
    );

    Ok(result)
}

/// decide and apply one captured file
fn restore_file<S>(store: &S, baseline: &Oid, file: &TreeFile, force: bool) -> Result<FileOutcome>
where
    S: ObjectStore + ?Sized,
{
    let wanted = store.read_blob(&file.blob)?;

    let Some(current) = store.current_file_bytes(&file.path)? else {
        debug!(path = %file.display_path(), "recreating missing file");
        store.write_file(&file.path, &wanted, file.mode)?;
        return Ok(FileOutcome::Restored);
    };

    if current == wanted {
        return Ok(FileOutcome::Unchanged);
    }

    let base = store.read_blob_at_commit(baseline, &file.path)?;
    let safe = match base.as_deref() {
        Some(base) => base == current.as_slice() || base == wanted.as_slice(),
        None => false,
    };

    if safe {
        debug!(path = %file.display_path(), "overwriting file unchanged since baseline");
        store.write_file(&file.path, &wanted, file.mode)?;
        return Ok(FileOutcome::Restored);
    }

    if force {
        debug!(path = %file.display_path(), "overwriting conflicting file");
        store.write_file(&file.path, &wanted, file.mode)?;
        return Ok(FileOutcome::Conflict { overwritten: true });
    }

    debug!(path = %file.display_path(), "conflict, leaving file as is");
    Ok(FileOutcome::Conflict { overwritten: false })
}

/// record the post-restore working tree as the unit's new baseline
fn rebaseline<S>(store: &S, config: &Config, work_unit_id: &str, baseline_path: &str) -> Result<()>
where
    S: ObjectStore + ?Sized,
{
    let tree = store.capture_working_tree()?;
    let message = CheckpointMessage::new(
        work_unit_id,
        BASELINE_NAME,
        CheckpointKind::Automatic,
        now_millis(),
        next_sequence(),
    );
    let commit = commit_snapshot(store, config, &tree, &message)?;
    store.write_ref(baseline_path, &commit)?;
    debug!(commit = %commit.short(), "moved restore baseline");
    Ok(())
}
