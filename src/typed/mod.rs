//! Typed module - operations on documents whose lists follow a schema.
//!
//! This module provides validation, field set extraction, comparison,
//! merging and item removal.

mod comparison;
mod parser;
mod typed_value;
mod validation;





pub use comparison::*;
pub use parser::*;
pub use typed_value::*;
pub use validation::*;
