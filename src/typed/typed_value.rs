//! TypedValue implementation.

use super::comparison::Comparison;
use super::validation::{Problem, ValidationError, ValidationErrors};
use crate::fieldpath::{Path, PathElement, Set};
use crate::schema::{ElementRelationship, ListRule, Schema};
use crate::value::{Field, FieldList, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// TypedValue is a document paired with the schema that gives its lists
/// their semantics. The document's `kind` selects the kind-specific rules.
#[derive(Debug, Clone)]
pub struct TypedValue {
    value: Value,
    kind: String,
    schema: Arc<Schema>,
}

/// Creates a new TypedValue after validating its lists against the schema.
pub fn as_typed(value: Value, schema: &Arc<Schema>) -> Result<TypedValue, ValidationErrors> {
    let tv = TypedValue::new(value, Arc::clone(schema));
    tv.validate()?;
    Ok(tv)
}

/// Creates a new TypedValue without validation.
pub fn as_typed_unvalidated(value: Value, schema: &Arc<Schema>) -> TypedValue {
    TypedValue::new(value, Arc::clone(schema))
}

/// How the items of one list are identified.
enum Items<'a> {
    Atomic,
    Set,
    Associative(&'a ListRule),
}

impl TypedValue {
    pub fn new(value: Value, schema: Arc<Schema>) -> Self {
        let kind = value.get_nested_str(&["kind"]).unwrap_or_default().to_string();
        TypedValue {
            value,
            kind,
            schema,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// A TypedValue of the same kind and schema holding `value`.
    pub fn with_value(&self, value: Value) -> TypedValue {
        TypedValue {
            value,
            kind: self.kind.clone(),
            schema: Arc::clone(&self.schema),
        }
    }

    fn items_at(&self, path: &Path) -> Items<'_> {
        match self.schema.list_rule(&self.kind, path) {
            Some(rule) if rule.relationship == ElementRelationship::Associative => {
                if rule.keys.is_empty() {
                    Items::Set
                } else {
                    Items::Associative(rule)
                }
            }
            Some(rule) if rule.relationship == ElementRelationship::Set => Items::Set,
            _ => Items::Atomic,
        }
    }

    fn is_ordered(&self, path: &Path) -> bool {
        self.schema
            .list_rule(&self.kind, path)
            .is_some_and(|rule| rule.ordered)
    }

    /// The path element of every item of the list at `path`, or None when
    /// the list has to be handled as a single value: it is atomic, or one of
    /// its items cannot be identified.
    fn list_elements(&self, items: &[Value], path: &Path) -> Option<Vec<PathElement>> {
        match self.items_at(path) {
            Items::Atomic => None,
            Items::Set => items
                .iter()
                .map(|item| item.is_scalar().then(|| PathElement::Value(item.clone())))
                .collect(),
            Items::Associative(rule) => items
                .iter()
                .map(|item| item_key(item, rule, path).ok().map(PathElement::Key))
                .collect(),
        }
    }

    /// Checks that every associative list item carries its key fields, that
    /// keys and set values are unique, and that set items are scalars.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        self.validate_value(&self.value, &mut Path::new(), &mut errors);
        errors.into_result()
    }

    fn validate_value(&self, value: &Value, path: &mut Path, errors: &mut ValidationErrors) {
        match value {
            Value::Map(map) => {
                for (key, child) in map.iter() {
                    path.push(PathElement::field_name(key.as_str()));
                    self.validate_value(child, path, errors);
                    path.pop();
                }
            }
            Value::List(items) => self.validate_list(items, path, errors),
            _ => {}
        }
    }

    fn validate_list(&self, items: &[Value], path: &mut Path, errors: &mut ValidationErrors) {
        let mut seen = BTreeSet::new();
        match self.items_at(path) {
            Items::Atomic => {}
            Items::Set => {
                for item in items {
                    if !item.is_scalar() {
                        errors.push(ValidationError::new(
                            path.to_string(),
                            Problem::NotAScalar(item.type_name()),
                        ));
                    } else if !seen.insert(PathElement::Value(item.clone())) {
                        errors.push(ValidationError::new(
                            path.to_string(),
                            Problem::Duplicate(PathElement::Value(item.clone()).to_string()),
                        ));
                    }
                }
            }
            Items::Associative(rule) => {
                for (i, item) in items.iter().enumerate() {
                    let element = match item_key(item, rule, &path.with(PathElement::index(i as i32))) {
                        Ok(key) => PathElement::Key(key),
                        Err(err) => {
                            errors.push(err);
                            continue;
                        }
                    };
                    if !seen.insert(element.clone()) {
                        errors.push(ValidationError::new(
                            path.to_string(),
                            Problem::Duplicate(element.to_string()),
                        ));
                        continue;
                    }
                    path.push(element);
                    self.validate_value(item, path, errors);
                    path.pop();
                }
            }
        }
    }

    /// Returns the set of paths this document sets. Scalars, atomic lists
    /// and empty containers are leaves; list items identified by key or
    /// value are members themselves as well as parents of their fields.
    pub fn to_field_set(&self) -> Set {
        let mut set = Set::new();
        self.collect_fields(&self.value, &mut Path::new(), &mut set);
        set
    }

    fn collect_fields(&self, value: &Value, path: &mut Path, set: &mut Set) {
        match value {
            Value::Map(map) if !map.is_empty() => {
                for (key, child) in map.iter() {
                    path.push(PathElement::field_name(key.as_str()));
                    self.collect_fields(child, path, set);
                    path.pop();
                }
            }
            Value::List(items) if !items.is_empty() => match self.list_elements(items, path) {
                Some(elements) => {
                    for (element, item) in elements.into_iter().zip(items) {
                        path.push(element);
                        set.insert(path);
                        if item.is_map() {
                            self.collect_fields(item, path, set);
                        }
                        path.pop();
                    }
                }
                None => set.insert(path),
            },
            _ => set.insert(path),
        }
    }

    /// Returns the paths of the values this document sets as a whole:
    /// non-null scalars and lists whose items cannot be told apart. Maps and
    /// identified list items are never atomic, even when empty.
    pub fn to_atomic_set(&self) -> Set {
        let mut set = Set::new();
        self.collect_atomic(&self.value, &mut Path::new(), &mut set);
        set
    }

    fn collect_atomic(&self, value: &Value, path: &mut Path, set: &mut Set) {
        match value {
            Value::Map(map) => {
                for (key, child) in map.iter() {
                    path.push(PathElement::field_name(key.as_str()));
                    self.collect_atomic(child, path, set);
                    path.pop();
                }
            }
            Value::List(items) => match self.list_elements(items, path) {
                Some(elements) => {
                    for (element, item) in elements.into_iter().zip(items) {
                        if item.is_map() {
                            path.push(element);
                            self.collect_atomic(item, path, set);
                            path.pop();
                        }
                    }
                }
                None => set.insert(path),
            },
            Value::Null => {}
            _ => set.insert(path),
        }
    }

    /// Compares this document (left) with `rhs` (right).
    pub fn compare(&self, rhs: &TypedValue) -> Comparison {
        let mut comparison = Comparison::new();
        self.compare_values(&self.value, &rhs.value, &mut Path::new(), &mut comparison);
        comparison
    }

    fn compare_values(&self, lhs: &Value, rhs: &Value, path: &mut Path, comparison: &mut Comparison) {
        match (lhs, rhs) {
            (Value::Map(l), Value::Map(r)) => self.compare_maps(l, r, path, comparison),
            (Value::List(l), Value::List(r)) => self.compare_lists(l, r, path, comparison),
            _ => {
                if lhs != rhs {
                    comparison.modified.insert(path);
                }
            }
        }
    }

    fn compare_maps(&self, lhs: &Map, rhs: &Map, path: &mut Path, comparison: &mut Comparison) {
        for (key, lhs_val) in lhs.iter() {
            path.push(PathElement::field_name(key.as_str()));
            match rhs.get(key) {
                None => comparison.removed.insert(path),
                Some(rhs_val) => self.compare_values(lhs_val, rhs_val, path, comparison),
            }
            path.pop();
        }
        for key in rhs.keys().filter(|k| !lhs.has(k)) {
            path.push(PathElement::field_name(key.as_str()));
            comparison.added.insert(path);
            path.pop();
        }
    }

    fn compare_lists(&self, lhs: &[Value], rhs: &[Value], path: &mut Path, comparison: &mut Comparison) {
        let (Some(lhs_elements), Some(rhs_elements)) =
            (self.list_elements(lhs, path), self.list_elements(rhs, path))
        else {
            if lhs != rhs {
                comparison.modified.insert(path);
            }
            return;
        };

        let lhs_items: BTreeMap<&PathElement, &Value> = lhs_elements.iter().zip(lhs).collect();
        let rhs_items: BTreeMap<&PathElement, &Value> = rhs_elements.iter().zip(rhs).collect();

        for (element, lhs_item) in &lhs_items {
            path.push((*element).clone());
            match rhs_items.get(element) {
                None => comparison.removed.insert(path),
                Some(rhs_item) => self.compare_values(lhs_item, rhs_item, path, comparison),
            }
            path.pop();
        }
        for element in rhs_items.keys().filter(|e| !lhs_items.contains_key(*e)) {
            path.push((*element).clone());
            comparison.added.insert(path);
            path.pop();
        }

        if self.is_ordered(path) {
            let lhs_order: Vec<&PathElement> = lhs_elements
                .iter()
                .filter(|e| rhs_items.contains_key(e))
                .collect();
            let rhs_order: Vec<&PathElement> = rhs_elements
                .iter()
                .filter(|e| lhs_items.contains_key(e))
                .collect();
            if lhs_order != rhs_order {
                comparison.modified.insert(path);
            }
        }
    }

    /// Merges `rhs` into this document. Values set on the right win; maps
    /// merge key by key; identified list items merge item by item; atomic
    /// lists are replaced.
    pub fn merge(&self, rhs: &TypedValue) -> TypedValue {
        self.with_value(self.merge_values(&self.value, &rhs.value, &mut Path::new()))
    }

    fn merge_values(&self, lhs: &Value, rhs: &Value, path: &mut Path) -> Value {
        match (lhs, rhs) {
            (_, Value::Null) => lhs.clone(),
            (Value::Map(l), Value::Map(r)) => {
                let mut merged = l.clone();
                for (key, rhs_val) in r.iter() {
                    let value = match l.get(key) {
                        Some(lhs_val) => {
                            path.push(PathElement::field_name(key.as_str()));
                            let value = self.merge_values(lhs_val, rhs_val, path);
                            path.pop();
                            value
                        }
                        None => rhs_val.clone(),
                    };
                    merged.set(key.as_str(), value);
                }
                Value::Map(merged)
            }
            (Value::List(l), Value::List(r)) => self.merge_lists(l, r, path),
            _ => rhs.clone(),
        }
    }

    fn merge_lists(&self, lhs: &[Value], rhs: &[Value], path: &mut Path) -> Value {
        let (Some(lhs_elements), Some(rhs_elements)) =
            (self.list_elements(lhs, path), self.list_elements(rhs, path))
        else {
            return Value::List(rhs.to_vec());
        };

        let lhs_items: BTreeMap<&PathElement, &Value> = lhs_elements.iter().zip(lhs).collect();
        let rhs_items: BTreeMap<&PathElement, &Value> = rhs_elements.iter().zip(rhs).collect();

        // Ordered lists follow the right-hand order, then keep the items only
        // the left side has. Unordered lists keep the left-hand order.
        let order: Vec<&PathElement> = if self.is_ordered(path) {
            rhs_elements.iter().chain(lhs_elements.iter()).collect()
        } else {
            lhs_elements.iter().chain(rhs_elements.iter()).collect()
        };

        let mut emitted = BTreeSet::new();
        let mut merged = Vec::with_capacity(order.len());
        for element in order {
            if !emitted.insert(element) {
                continue;
            }
            let item = match (lhs_items.get(element), rhs_items.get(element)) {
                (Some(l), Some(r)) => {
                    path.push(element.clone());
                    let item = self.merge_values(l, r, path);
                    path.pop();
                    item
                }
                (Some(only), None) | (None, Some(only)) => (*only).clone(),
                (None, None) => continue,
            };
            merged.push(item);
        }
        Value::List(merged)
    }

    /// Returns a copy without the given paths. Removing a list item drops it
    /// from the list; removing a map key drops the key.
    pub fn remove_items(&self, items: &Set) -> TypedValue {
        self.with_value(self.remove_from(&self.value, items, &mut Path::new()))
    }

    fn remove_from(&self, value: &Value, items: &Set, path: &mut Path) -> Value {
        if !items.has_prefix(path) {
            return value.clone();
        }

        match value {
            Value::Map(map) => {
                let mut kept = Map::new();
                for (key, child) in map.iter() {
                    path.push(PathElement::field_name(key.as_str()));
                    if !items.has(path) {
                        kept.set(key.as_str(), self.remove_from(child, items, path));
                    }
                    path.pop();
                }
                Value::Map(kept)
            }
            Value::List(list) => match self.list_elements(list, path) {
                Some(elements) => {
                    let mut kept = Vec::with_capacity(list.len());
                    for (element, item) in elements.into_iter().zip(list) {
                        path.push(element);
                        if !items.has(path) {
                            kept.push(self.remove_from(item, items, path));
                        }
                        path.pop();
                    }
                    Value::List(kept)
                }
                None => value.clone(),
            },
            _ => value.clone(),
        }
    }
}

/// Builds the key of an associative list item from its key fields.
fn item_key(item: &Value, rule: &ListRule, path: &Path) -> Result<FieldList, ValidationError> {
    let map = item
        .as_map()
        .ok_or_else(|| ValidationError::new(path.to_string(), Problem::NotAMap(item.type_name())))?;

    let mut fields = Vec::with_capacity(rule.keys.len());
    for key in &rule.keys {
        match map.get(key) {
            Some(v) if v.is_scalar() && !v.is_null() => fields.push(Field {
                name: key.clone(),
                value: v.clone(),
            }),
            _ => {
                return Err(ValidationError::new(
                    path.to_string(),
                    Problem::MissingKey(key.clone()),
                ))
            }
        }
    }
    Ok(FieldList::with_fields(fields))
}
