//! Cluster module - the API authority the engine talks to.
//!
//! [`ClusterClient`] is the only seam between the engine and a cluster.
//! [`InMemoryCluster`] implements it with ownership-aware merges and is used
//! by the tests and the command line tool.

mod client;
mod memory;

#[cfg(test)]
mod memory_test;

pub use client::*;
pub use memory::*;
