//! Parser for creating typed values from documents.

use super::typed_value::{as_typed, as_typed_unvalidated, TypedValue};
use crate::schema::{kubernetes, ListRule, Schema};
use crate::value::{self, Value};
use std::sync::Arc;
use thiserror::Error;

/// Parser turns raw documents into typed values that share one schema.
#[derive(Debug, Clone)]
pub struct Parser {
    schema: Arc<Schema>,
}

impl Default for Parser {
    fn default() -> Self {
        Parser::kubernetes()
    }
}

impl Parser {
    pub fn new(schema: Arc<Schema>) -> Self {
        Parser { schema }
    }

    /// A parser for native kinds.
    pub fn kubernetes() -> Self {
        Parser::new(kubernetes())
    }

    /// A parser for native kinds plus the list rules of a YAML document
    /// (a sequence of rules).
    pub fn with_rules_yaml(rules_yaml: &str) -> Result<Parser, ParseError> {
        let rules: Vec<ListRule> = serde_yaml::from_str(rules_yaml)
            .map_err(|e| ParseError::new(format!("failed to parse list rules: {}", e)))?;
        Ok(Parser::new(Arc::new(kubernetes().extended(rules))))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml(&self, yaml: &str) -> Result<TypedValue, ParseError> {
        let value = value::from_yaml(yaml)
            .map_err(|e| ParseError::new(format!("failed to parse YAML: {}", e)))?;
        self.from_value(value)
    }

    /// Validates a document.
    pub fn from_value(&self, value: Value) -> Result<TypedValue, ParseError> {
        as_typed(value, &self.schema).map_err(|e| ParseError::new(format!("validation failed: {}", e)))
    }

    /// Wraps a document without validating it.
    pub fn from_value_unvalidated(&self, value: Value) -> TypedValue {
        as_typed_unvalidated(value, &self.schema)
    }
}

/// Error type for parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}
