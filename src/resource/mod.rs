//! Resource module - identities and well-known fields of cluster objects.

mod defaults;
mod identity;
mod meta;

pub use defaults::*;
pub use identity::*;
pub use meta::*;
