//! # SSA Engine
//!
//! A server-side apply change-set and reconciliation engine for
//! Kubernetes-style APIs.
//!
//! The engine dry-runs every apply against the cluster, classifies the
//! result against the live object over the fields its field manager owns,
//! masks sensitive values, prunes fields the desired object stopped setting,
//! and applies batches in dependency order.
//!
//! ## Modules
//!
//! - [`value`] - In-memory representation of resource documents
//! - [`fieldpath`] - Field paths, path sets and per-manager ownership
//! - [`schema`] - List semantics used for comparison and ownership
//! - [`typed`] - Comparison, merge and field set extraction over documents
//! - [`merge`] - Ownership-aware apply with conflict detection
//! - [`resource`] - Resource identity and well-known metadata
//! - [`ssa`] - Change sets and the reconciliation engine
//! - [`cluster`] - The cluster API boundary and an in-memory implementation
//! - [`error`] - Engine error types

pub mod cluster;
pub mod error;
pub mod fieldpath;
pub mod merge;
pub mod resource;
pub mod schema;
pub mod ssa;
pub mod typed;
pub mod value;

pub use cluster::{ApplyRequest, ClusterClient, InMemoryCluster};
pub use error::{BatchError, Error};
pub use fieldpath::{ManagedFields, Path, PathElement, Set as FieldPathSet};
pub use resource::ResourceIdentity;
pub use ssa::{
    Action, ApplyOptions, ChangeSet, ChangeSetEntry, Config, Context, DeleteOptions, Masker,
    ResourceManager,
};
pub use value::Value;
