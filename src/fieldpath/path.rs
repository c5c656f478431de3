//! Paths into resource documents.

use crate::value::{FieldList, Value};
use std::cmp::Ordering;
use std::fmt;

/// PathElement is one step from a container to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    /// A map key.
    FieldName(String),
    /// An associative list element, identified by its key fields.
    Key(FieldList),
    /// A set element, identified by its own scalar value.
    Value(Value),
    /// A positional list element.
    Index(i32),
}

impl PathElement {
    pub fn field_name(name: impl Into<String>) -> Self {
        PathElement::FieldName(name.into())
    }

    pub fn key(fields: FieldList) -> Self {
        PathElement::Key(fields)
    }

    pub fn value(v: Value) -> Self {
        PathElement::Value(v)
    }

    pub fn index(i: i32) -> Self {
        PathElement::Index(i)
    }

    pub fn as_field_name(&self) -> Option<&str> {
        match self {
            PathElement::FieldName(name) => Some(name),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PathElement::FieldName(_) => 0,
            PathElement::Key(_) => 1,
            PathElement::Value(_) => 2,
            PathElement::Index(_) => 3,
        }
    }
}

impl PartialOrd for PathElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathElement {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PathElement::FieldName(a), PathElement::FieldName(b)) => a.cmp(b),
            (PathElement::Key(a), PathElement::Key(b)) => a.cmp(b),
            (PathElement::Value(a), PathElement::Value(b)) => a.cmp(b),
            (PathElement::Index(a), PathElement::Index(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// Path is a sequence of elements leading from the document root to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    elements: Vec<PathElement>,
}

impl Path {
    pub fn new() -> Self {
        Path {
            elements: Vec::new(),
        }
    }

    pub fn from_elements(elements: Vec<PathElement>) -> Self {
        Path { elements }
    }

    /// Builds a path made only of map keys.
    pub fn from_fields(fields: &[&str]) -> Self {
        fields.iter().map(|f| PathElement::field_name(*f)).collect()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.elements.iter()
    }

    pub fn push(&mut self, element: PathElement) {
        self.elements.push(element);
    }

    pub fn pop(&mut self) -> Option<PathElement> {
        self.elements.pop()
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.elements.last()
    }

    /// Returns a copy of the path extended by `element`.
    pub fn with(&self, element: PathElement) -> Self {
        let mut extended = self.clone();
        extended.push(element);
        extended
    }

    /// Returns true if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.elements.starts_with(&prefix.elements)
    }

    pub fn as_slice(&self) -> &[PathElement] {
        &self.elements
    }

    /// The dotted map-key path with list hops dropped, e.g.
    /// `.spec.metrics[type="Pods"].pods` becomes `spec.metrics.pods`.
    pub fn field_pattern(&self) -> String {
        self.elements
            .iter()
            .filter_map(PathElement::as_field_name)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Finds the node this path points at in `root`. Key elements match the
    /// first list item carrying all of their fields.
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for element in &self.elements {
            current = match element {
                PathElement::FieldName(name) => current.as_map()?.get(name)?,
                PathElement::Key(fields) => current.as_list()?.iter().find(|item| {
                    item.as_map().is_some_and(|m| {
                        fields.iter().all(|f| m.get(&f.name) == Some(&f.value))
                    })
                })?,
                PathElement::Value(v) => current.as_list()?.iter().find(|item| *item == v)?,
                PathElement::Index(i) => current.as_list()?.get(usize::try_from(*i).ok()?)?,
            };
        }
        Some(current)
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<T: IntoIterator<Item = PathElement>>(iter: T) -> Self {
        Path {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a PathElement;
    type IntoIter = std::slice::Iter<'a, PathElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

fn fmt_scalar(v: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match v {
        Value::String(s) => write!(f, "{:?}", s),
        Value::Int(i) => write!(f, "{}", i),
        Value::Float(x) => write!(f, "{}", x),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Null => write!(f, "null"),
        other => write!(f, "<{}>", other.type_name()),
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::FieldName(name) => write!(f, ".{}", name),
            PathElement::Key(fields) => {
                write!(f, "[")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}=", field.name)?;
                    fmt_scalar(&field.value, f)?;
                }
                write!(f, "]")
            }
            PathElement::Value(v) => {
                write!(f, "[=")?;
                fmt_scalar(v, f)?;
                write!(f, "]")
            }
            PathElement::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            write!(f, "{}", element)?;
        }
        Ok(())
    }
}
