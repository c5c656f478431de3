//! SSA module - change sets and reconciliation of desired objects against a
//! cluster using server-side apply.
//!
//! [`ResourceManager`] is the entry point. It dry-runs every apply, decides
//! from the result whether anything would change, prunes fields the caller
//! stopped setting, and writes only what differs. Batches are applied in
//! stages so definitions exist before the objects that need them.

mod changeset;
mod classify;
mod context;
mod manager;
mod mask;
mod options;
mod prune;
mod stage;

#[cfg(test)]
mod manager_test;

pub use changeset::*;
pub use classify::*;
pub use context::*;
pub use manager::*;
pub use mask::*;
pub use options::*;
pub use prune::*;
pub use stage::*;
