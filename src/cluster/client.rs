//! The boundary between the engine and the cluster API.

use crate::error::Error;
use crate::resource::ResourceIdentity;
use crate::ssa::RemovalPatch;
use crate::value::Value;
use async_trait::async_trait;

/// ApplyRequest is one server-side apply call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRequest {
    pub object: Value,
    pub field_manager: String,
    /// Take ownership of conflicting fields.
    pub force: bool,
    /// Compute the result without persisting it.
    pub dry_run: bool,
    /// Fields to delete in the same call.
    pub removals: RemovalPatch,
}

impl ApplyRequest {
    pub fn new(object: Value, field_manager: impl Into<String>) -> Self {
        ApplyRequest {
            object,
            field_manager: field_manager.into(),
            force: false,
            dry_run: false,
            removals: RemovalPatch::default(),
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn removals(mut self, removals: RemovalPatch) -> Self {
        self.removals = removals;
        self
    }
}

/// Trait abstracting the cluster API authority.
///
/// The authority performs merges, defaulting and conflict detection; the
/// engine only reasons about its answers.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Reads the live object, or None when it does not exist.
    async fn get(&self, id: &ResourceIdentity) -> Result<Option<Value>, Error>;

    /// Server-side applies an object and returns the resulting object. With
    /// `dry_run` set nothing is persisted.
    async fn apply(&self, request: ApplyRequest) -> Result<Value, Error>;

    /// Deletes an object. Fails with `NotFound` when it does not exist.
    async fn delete(&self, id: &ResourceIdentity) -> Result<(), Error>;

    /// Reports whether an object exists and is ready for use. For custom
    /// resource definitions this means established.
    async fn is_ready(&self, id: &ResourceIdentity) -> Result<bool, Error>;
}
