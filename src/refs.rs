use crate::error::{Error, Result};

/// reserved name of the per-unit restore baseline ref
pub const BASELINE_NAME: &str = "@baseline";

/// `refs/<prefix>/<workUnitId>/`, the namespace of one unit of work
pub fn unit_prefix(prefix: &str, work_unit_id: &str) -> String {
    format!("refs/{}/{}/", prefix, work_unit_id)
}

/// `refs/<prefix>/<workUnitId>/<name>`
pub fn checkpoint_ref(prefix: &str, work_unit_id: &str, name: &str) -> String {
    format!("{}{}", unit_prefix(prefix, work_unit_id), name)
}

/// ref holding the last state a restore or create left the working tree in
pub fn baseline_ref(prefix: &str, work_unit_id: &str) -> String {
    checkpoint_ref(prefix, work_unit_id, BASELINE_NAME)
}

/// checkpoint name of a full ref inside the unit namespace
///
/// refs nested deeper than one level are not checkpoints and yield `None`
pub fn name_from_ref<'a>(prefix: &str, work_unit_id: &str, full: &'a str) -> Option<&'a str> {
    let name = full.strip_prefix(&unit_prefix(prefix, work_unit_id))?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name)
}

/// whether a name belongs to an internal ref rather than a checkpoint
pub fn is_reserved(name: &str) -> bool {
    name.starts_with('@')
}

/// validate a work-unit id
pub fn validate_work_unit_id(id: &str) -> Result<()> {
    validate_component("work unit id", id)
}

/// validate a checkpoint name; names starting with '@' are reserved
pub fn validate_name(name: &str) -> Result<()> {
    validate_component("checkpoint name", name)?;
    if is_reserved(name) {
        return Err(invalid("checkpoint name", name, "names starting with '@' are reserved"));
    }
    Ok(())
}

/// a single ref path component that also fits the colon-delimited message header
fn validate_component(what: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(what, value, "empty"));
    }

    if let Some(c) = value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control())
    {
        let reason = if c.is_whitespace() {
            "cannot contain whitespace"
        } else {
            "cannot contain control characters"
        };
        return Err(invalid(what, value, reason));
    }

    if value.contains(':') {
        return Err(invalid(what, value, "cannot contain ':'"));
    }
    if value.contains('/') {
        return Err(invalid(what, value, "cannot contain '/'"));
    }
    if value.contains(['~', '^', '?', '*', '[', '\\']) {
        return Err(invalid(what, value, "cannot contain ~ ^ ? * [ or \\"));
    }
    if value.contains("..") || value.contains("@{") {
        return Err(invalid(what, value, "cannot contain '..' or '@{'"));
    }
    if value.starts_with('.') || value.starts_with('-') {
        return Err(invalid(what, value, "cannot start with '.' or '-'"));
    }
    if value.ends_with('.') || value.ends_with(".lock") {
        return Err(invalid(what, value, "cannot end with '.' or '.lock'"));
    }

    Ok(())
}

fn invalid(what: &'static str, value: &str, reason: &'static str) -> Error {
    Error::InvalidName {
        what,
        value: value.to_string(),
        reason,
    }
}
