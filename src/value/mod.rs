//! Value module - schemaless representation of resource documents.
//!
//! Resources are handled as nested maps, lists and scalars rather than typed
//! structs so that any kind can flow through the engine.

mod value;

pub use value::*;
