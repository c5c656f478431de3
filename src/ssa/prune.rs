//! Explicit removal of fields the desired object no longer sets.
//!
//! Server-side apply treats a field left out of a payload as "no opinion",
//! so a manager that stops setting a field keeps it live until it asks for
//! the removal. The removal travels with the apply itself.

use crate::error::Error;
use crate::fieldpath::{ManagedFields, Path, PathElement, Set};
use crate::resource::ResourceIdentity;
use crate::schema::Schema;
use crate::typed::as_typed_unvalidated;
use crate::value::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

const PATCH_DIRECTIVE: &str = "$patch";
const DELETE_FROM_PRIMITIVE_LIST: &str = "$deleteFromPrimitiveList";

/// RemovalPatch lists the fields an apply must delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalPatch {
    pub paths: Set,
}

impl RemovalPatch {
    pub fn new(paths: Set) -> Self {
        RemovalPatch { paths }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Renders the removals as a strategic-merge-patch document: map keys
    /// become `null`, keyed list items carry `$patch: delete` and set items
    /// are listed under `$deleteFromPrimitiveList/<field>`.
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        for path in self.paths.paths() {
            render(&mut root, path.as_slice());
        }
        Value::Map(root)
    }
}

fn render(map: &mut Map, elements: &[PathElement]) {
    match elements {
        [PathElement::FieldName(name)] => map.set(name.as_str(), Value::Null),
        [PathElement::FieldName(name), PathElement::Value(item)] => {
            let key = format!("{}/{}", DELETE_FROM_PRIMITIVE_LIST, name);
            let Some(list) = list_entry(map, &key) else {
                return;
            };
            if !list.contains(item) {
                list.push(item.clone());
            }
        }
        [PathElement::FieldName(name), PathElement::Key(key), rest @ ..] => {
            let Some(list) = list_entry(map, name) else {
                return;
            };
            let position = list.iter().position(|item| {
                key.iter()
                    .all(|field| item.get_nested(&[field.name.as_str()]) == Some(&field.value))
            });
            let index = match position {
                Some(index) => index,
                None => {
                    list.push(Value::Map(key.to_map()));
                    list.len() - 1
                }
            };
            if let Some(item) = list[index].as_map_mut() {
                if rest.is_empty() {
                    item.set(PATCH_DIRECTIVE, "delete".into());
                } else {
                    render(item, rest);
                }
            }
        }
        [PathElement::FieldName(name), rest @ ..] if !rest.is_empty() => {
            let child = map
                .fields
                .entry(name.clone())
                .or_insert_with(|| Value::Map(Map::new()));
            if !child.is_map() {
                *child = Value::Map(Map::new());
            }
            if let Some(child) = child.as_map_mut() {
                render(child, rest);
            }
        }
        // positional items have no patch form
        _ => {}
    }
}

fn list_entry<'a>(map: &'a mut Map, key: &str) -> Option<&'a mut Vec<Value>> {
    let entry = map
        .fields
        .entry(key.to_string())
        .or_insert_with(|| Value::List(Vec::new()));
    if !entry.is_list() {
        *entry = Value::List(Vec::new());
    }
    entry.as_list_mut()
}

/// Computes the fields `field_manager` owns on `live` that `desired` no
/// longer sets. Fields another manager also owns, or that sit below a value
/// the desired object sets as a whole, are left alone. A removed list item
/// is listed once rather than field by field.
pub fn reconcile_removals(
    desired: &Value,
    live: Option<&Value>,
    field_manager: &str,
    schema: &Arc<Schema>,
) -> Result<RemovalPatch, Error> {
    let Some(live) = live else {
        return Ok(RemovalPatch::default());
    };

    let managers = ManagedFields::from_object(live)?;
    let owned = managers.owned_by(field_manager);
    if owned.is_empty() {
        return Ok(RemovalPatch::default());
    }
    let others = managers.owned_by_others(field_manager);
    let desired = as_typed_unvalidated(desired.clone(), schema);
    let wanted = desired.to_field_set();
    let atomic = desired.to_atomic_set();

    let candidates = owned.filter(|path| {
        !wanted.has_prefix(path) && !atomic.covers(path) && !others.has(path)
    });
    let removals = candidates.filter(|path| !has_ancestor(&candidates, path));
    Ok(RemovalPatch::new(removals))
}

fn has_ancestor(set: &Set, path: &Path) -> bool {
    let mut parent = path.clone();
    parent.pop();
    set.covers(&parent)
}

/// Identities recorded by an earlier run that the desired batch no longer
/// contains, in their recorded order.
pub fn stale_identities<'a>(
    previous: impl IntoIterator<Item = &'a ResourceIdentity>,
    desired: &[ResourceIdentity],
) -> Vec<ResourceIdentity> {
    let wanted: BTreeSet<&ResourceIdentity> = desired.iter().collect();
    previous
        .into_iter()
        .filter(|id| !wanted.contains(id))
        .cloned()
        .collect()
}
