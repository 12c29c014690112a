use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::ops::list;
use crate::refs::{checkpoint_ref, validate_name, validate_work_unit_id};
use crate::store::ObjectStore;
use crate::types::CleanupReport;

/// keep the newest `keep_last` checkpoints of a unit, delete the rest
///
/// manual and automatic checkpoints are ranked together. running it again
/// with the same `keep_last` deletes nothing.
pub fn cleanup<S>(
    store: &S,
    config: &Config,
    work_unit_id: &str,
    keep_last: usize,
) -> Result<CleanupReport>
where
    S: ObjectStore + ?Sized,
{
    let checkpoints = list(store, config, work_unit_id)?;

    let mut report = CleanupReport::default();
    for (rank, checkpoint) in checkpoints.into_iter().enumerate() {
        if rank < keep_last {
            report.preserved.push(checkpoint.name);
            continue;
        }
        store.delete_ref(&checkpoint.ref_path)?;
        info!(
            work_unit = work_unit_id,
            name = %checkpoint.name,
            commit = %checkpoint.commit.short(),
            "deleted checkpoint"
        );
        report.deleted.push(checkpoint.name);
    }

    Ok(report)
}

/// delete one checkpoint, returning whether it existed
pub fn delete<S>(store: &S, config: &Config, work_unit_id: &str, name: &str) -> Result<bool>
where
    S: ObjectStore + ?Sized,
{
    validate_work_unit_id(work_unit_id)?;
    validate_name(name)?;

    let ref_path = checkpoint_ref(&config.ref_prefix, work_unit_id, name);
    if store.read_ref(&ref_path)?.is_none() {
        return Ok(false);
    }
    store.delete_ref(&ref_path)?;
    info!(work_unit = work_unit_id, name, "deleted checkpoint");
    Ok(true)
}
