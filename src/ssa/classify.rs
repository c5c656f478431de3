//! Classification of a dry-run result against the live object.

use super::changeset::Action;
use crate::error::Error;
use crate::fieldpath::{ManagedFields, Set};
use crate::resource::strip_server_fields;
use crate::schema::Schema;
use crate::typed::{as_typed_unvalidated, Comparison};
use crate::value::Value;
use std::sync::Arc;

/// Returns the fields `field_manager` owns on either object, or None when
/// neither object records ownership for it.
pub fn owned_fields(live: &Value, merged: &Value, field_manager: &str) -> Result<Option<Set>, Error> {
    let on_live = ManagedFields::from_object(live)?;
    let on_merged = ManagedFields::from_object(merged)?;
    if !on_live.contains(field_manager) && !on_merged.contains(field_manager) {
        return Ok(None);
    }
    Ok(Some(
        on_live
            .owned_by(field_manager)
            .union(&on_merged.owned_by(field_manager)),
    ))
}

/// Compares the live object with the dry-run result.
///
/// Server-maintained metadata and status are ignored. When ownership is
/// recorded for `field_manager`, only changes that touch its fields count,
/// so edits made by other writers do not show up as drift.
pub fn drift(
    live: &Value,
    merged: &Value,
    field_manager: &str,
    schema: &Arc<Schema>,
) -> Result<Comparison, Error> {
    let owned = owned_fields(live, merged, field_manager)?;

    let before = as_typed_unvalidated(strip_server_fields(live), schema);
    let after = as_typed_unvalidated(strip_server_fields(merged), schema);
    let mut comparison = before.compare(&after);

    if let Some(owned) = owned {
        comparison.retain_overlapping(&owned);
    }
    Ok(comparison)
}

/// Assigns the action a dry-run result stands for: `Created` when nothing is
/// live, otherwise `Configured` or `Unchanged` depending on [`drift`].
pub fn classify(
    live: Option<&Value>,
    merged: &Value,
    field_manager: &str,
    schema: &Arc<Schema>,
) -> Result<Action, Error> {
    let Some(live) = live else {
        return Ok(Action::Created);
    };
    if drift(live, merged, field_manager, schema)?.is_same() {
        Ok(Action::Unchanged)
    } else {
        Ok(Action::Configured)
    }
}
