//! Problems found while checking list items against their list semantics.

use std::fmt;
use thiserror::Error;

/// What is wrong with a list item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// A keyed list item is not a map; carries the type found.
    NotAMap(&'static str),
    /// A set item is not a scalar; carries the type found.
    NotAScalar(&'static str),
    /// A keyed list item lacks one of its key fields.
    MissingKey(String),
    /// Two items share a key or set value.
    Duplicate(String),
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::NotAMap(found) => write!(f, "keyed list item must be a map, not {}", found),
            Problem::NotAScalar(found) => write!(f, "set item must be a scalar, not {}", found),
            Problem::MissingKey(field) => write!(f, "list item has no key field {:?}", field),
            Problem::Duplicate(item) => write!(f, "{} appears more than once", item),
        }
    }
}

/// ValidationError ties a [`Problem`] to the list it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {problem}")]
pub struct ValidationError {
    pub path: String,
    pub problem: Problem,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, problem: Problem) -> Self {
        ValidationError {
            path: path.into(),
            problem,
        }
    }
}

/// ValidationErrors holds every problem found in one document, so a
/// rejection reports them all at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        ValidationErrors::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
