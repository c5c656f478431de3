//! The `fieldsV1` encoding used by `metadata.managedFields`.
//!
//! A set is encoded as a nested map whose keys are path elements:
//! `f:<name>` for map keys, `k:<json object>` for associative list keys,
//! `v:<json>` for set values and `i:<n>` for positions. The special key `.`
//! inside a child map marks the child path itself as a member.

use super::path::PathElement;
use super::set::Set;
use crate::value::{self, Field, FieldList, Map, Value};
use thiserror::Error;

/// Error produced while decoding ownership metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SerializeError {
    pub message: String,
}

impl SerializeError {
    pub fn new(message: impl Into<String>) -> Self {
        SerializeError {
            message: message.into(),
        }
    }
}

/// Encodes a path element as a `fieldsV1` key.
pub fn serialize_path_element(pe: &PathElement) -> Result<String, SerializeError> {
    let encoded = match pe {
        PathElement::FieldName(name) => format!("f:{}", name),
        PathElement::Key(fields) => format!("k:{}", json(&Value::Map(fields.to_map()))?),
        PathElement::Value(v) => format!("v:{}", json(v)?),
        PathElement::Index(i) => format!("i:{}", i),
    };
    Ok(encoded)
}

/// Decodes a `fieldsV1` key into a path element.
pub fn deserialize_path_element(s: &str) -> Result<PathElement, SerializeError> {
    let (prefix, content) = s
        .split_once(':')
        .ok_or_else(|| SerializeError::new(format!("malformed path element {:?}", s)))?;

    match prefix {
        "f" => Ok(PathElement::FieldName(content.to_string())),
        "v" => Ok(PathElement::Value(parse_json(content)?)),
        "k" => match parse_json(content)? {
            Value::Map(map) => Ok(PathElement::Key(FieldList::with_fields(
                map.iter()
                    .map(|(name, value)| Field {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            ))),
            other => Err(SerializeError::new(format!(
                "expected object for key element, got {}",
                other.type_name()
            ))),
        },
        "i" => content
            .parse::<i32>()
            .map(PathElement::Index)
            .map_err(|e| SerializeError::new(format!("invalid index {:?}: {}", content, e))),
        _ => Err(SerializeError::new(format!(
            "unknown path element prefix {:?}",
            prefix
        ))),
    }
}

fn json(v: &Value) -> Result<String, SerializeError> {
    value::to_json(v).map_err(|e| SerializeError::new(format!("encoding element: {}", e)))
}

fn parse_json(s: &str) -> Result<Value, SerializeError> {
    value::from_json(s).map_err(|e| SerializeError::new(format!("decoding element {:?}: {}", s, e)))
}

impl Set {
    /// Renders the set as a `fieldsV1` document.
    pub fn to_fields_v1(&self) -> Result<Value, SerializeError> {
        let mut node = Map::new();

        for member in &self.members {
            if !self.children.contains_key(member) {
                node.set(serialize_path_element(member)?, Value::Map(Map::new()));
            }
        }

        for (element, child) in &self.children {
            let mut rendered = match child.to_fields_v1()? {
                Value::Map(m) => m,
                _ => Map::new(),
            };
            if self.members.contains(element) {
                rendered.set(".", Value::Map(Map::new()));
            }
            node.set(serialize_path_element(element)?, Value::Map(rendered));
        }

        Ok(Value::Map(node))
    }

    /// Parses a `fieldsV1` document.
    pub fn from_fields_v1(v: &Value) -> Result<Set, SerializeError> {
        let node = v.as_map().ok_or_else(|| {
            SerializeError::new(format!("expected object in fieldsV1, got {}", v.type_name()))
        })?;

        let mut set = Set::new();
        for (key, child) in node.iter() {
            if key == "." {
                continue;
            }
            let element = deserialize_path_element(key)?;
            let child_map = child.as_map().ok_or_else(|| {
                SerializeError::new(format!("expected object under {:?}", key))
            })?;

            if child_map.is_empty() || child_map.has(".") {
                set.members.insert(element.clone());
            }
            let nested = Set::from_fields_v1(child)?;
            if !nested.is_empty() {
                set.children.insert(element, nested);
            }
        }
        Ok(set)
    }
}
