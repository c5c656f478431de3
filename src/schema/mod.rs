//! Schema module - the list semantics used when comparing, merging and
//! tracking ownership of schemaless resource documents.
//!
//! Maps are always granular: each key is owned and diffed on its own. Lists
//! default to atomic unless a [`ListRule`] says otherwise.

mod elements;
mod kubernetes;

pub use elements::*;
pub use kubernetes::*;
