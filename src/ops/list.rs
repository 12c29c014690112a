use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::refs::{
    checkpoint_ref, is_reserved, name_from_ref, unit_prefix, validate_name, validate_work_unit_id,
};
use crate::store::ObjectStore;
use crate::types::{Checkpoint, CheckpointMessage, CheckpointSummary};

/// checkpoints of a unit of work, newest first
///
/// refs whose commit message is not a checkpoint message are skipped with a
/// warning.
pub fn list<S>(store: &S, config: &Config, work_unit_id: &str) -> Result<Vec<CheckpointSummary>>
where
    S: ObjectStore + ?Sized,
{
    validate_work_unit_id(work_unit_id)?;

    let prefix = unit_prefix(&config.ref_prefix, work_unit_id);
    let mut checkpoints = Vec::new();

    for full in store.list_refs(&prefix)? {
        let Some(name) = name_from_ref(&config.ref_prefix, work_unit_id, &full) else {
            debug!(git_ref = %full, "ignoring nested ref");
            continue;
        };
        if is_reserved(name) {
            continue;
        }
        if let Some(summary) = load_summary(store, work_unit_id, name, &full)? {
            checkpoints.push(summary);
        }
    }

    checkpoints.sort_by(newest_first);
    Ok(checkpoints)
}

/// a single checkpoint with the files it captured, `None` if absent
pub fn get<S>(
    store: &S,
    config: &Config,
    work_unit_id: &str,
    name: &str,
) -> Result<Option<Checkpoint>>
where
    S: ObjectStore + ?Sized,
{
    validate_work_unit_id(work_unit_id)?;
    validate_name(name)?;

    let ref_path = checkpoint_ref(&config.ref_prefix, work_unit_id, name);
    let Some(summary) = load_summary(store, work_unit_id, name, &ref_path)? else {
        return Ok(None);
    };

    let captured_files = store
        .tree_files(&summary.commit)?
        .into_iter()
        .map(|f| f.display_path())
        .collect();

    Ok(Some(Checkpoint {
        summary,
        captured_files,
    }))
}

/// read a checkpoint ref and decode its commit message
fn load_summary<S>(
    store: &S,
    work_unit_id: &str,
    name: &str,
    ref_path: &str,
) -> Result<Option<CheckpointSummary>>
where
    S: ObjectStore + ?Sized,
{
    let Some(commit) = store.read_ref(ref_path)? else {
        return Ok(None);
    };
    let info = store.read_commit(&commit)?;

    let message = match CheckpointMessage::parse(&info.message) {
        Ok(message) => message,
        Err(e) => {
            warn!(git_ref = ref_path, error = %e, "skipping ref without a checkpoint message");
            return Ok(None);
        }
    };

    Ok(Some(CheckpointSummary {
        work_unit_id: work_unit_id.to_string(),
        name: name.to_string(),
        kind: message.kind,
        commit,
        ref_path: ref_path.to_string(),
        created_at: message.created_at,
        sequence: message.sequence,
    }))
}

/// creation time, then sequence, descending; name ascending breaks the rest
pub(crate) fn newest_first(a: &CheckpointSummary, b: &CheckpointSummary) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then(b.sequence.cmp(&a.sequence))
        .then_with(|| a.name.cmp(&b.name))
}
