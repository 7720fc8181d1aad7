//! Composite custom-ids for message components.
//!
//! Every interactive element a component renders carries
//! `"<component><SEPARATOR><action>"` so the dispatcher can recover the owning
//! handler and the action from the wire string alone. The separator is
//! reserved: neither part may contain it.

use crate::common::error::CustomIdError;

/// Token joining the component name and the action.
pub const SEPARATOR: &str = "__";

/// Longest custom-id Discord accepts.
pub const MAX_CUSTOM_ID_LEN: usize = 100;

/// Build the custom-id for `action` within component `name`.
pub fn compose(name: &str, action: &str) -> Result<String, CustomIdError> {
    check_part("name", name)?;
    check_part("action", action)?;

    let custom_id = format!("{name}{SEPARATOR}{action}");
    if split(&custom_id) != Some((name, action)) {
        return Err(CustomIdError::Ambiguous { custom_id });
    }
    let len = custom_id.chars().count();
    if len > MAX_CUSTOM_ID_LEN {
        return Err(CustomIdError::TooLong {
            len,
            limit: MAX_CUSTOM_ID_LEN,
        });
    }
    Ok(custom_id)
}

fn check_part(part: &'static str, value: &str) -> Result<(), CustomIdError> {
    if value.is_empty() {
        return Err(CustomIdError::EmptyPart { part });
    }
    if value.contains(SEPARATOR) {
        return Err(CustomIdError::ReservedSeparator {
            part,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Split a wire custom-id into `(name, action)`.
///
/// Returns `None` unless the id holds exactly two non-empty parts, which is
/// how ids from other bots or older layouts are recognised and ignored.
pub fn split(custom_id: &str) -> Option<(&str, &str)> {
    let mut parts = custom_id.split(SEPARATOR);
    let name = parts.next()?;
    let action = parts.next()?;
    if parts.next().is_some() || name.is_empty() || action.is_empty() {
        return None;
    }
    Some((name, action))
}
