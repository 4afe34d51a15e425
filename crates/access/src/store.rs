//! Access store boundary.
//!
//! This module defines the persistence-facing abstraction the engine depends
//! on, without making any storage assumptions. The editors write through it;
//! [`resolve_user`] snapshots it and hands the snapshot to the pure resolver.

use std::collections::HashSet;

use thiserror::Error;

use opshub_core::{PermissionId, RoleId, UserId};

use crate::catalog::{Catalog, Effect, Permission, Role, RolePermission, UserPermissionOverride};
use crate::resolver::{resolve, EffectivePermission};

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessStoreError {
    /// A write referenced a role id absent from the role store.
    #[error("unknown role: {0}")]
    UnknownRole(RoleId),

    /// A write referenced a permission id absent from the catalog.
    #[error("unknown permission: {0}")]
    UnknownPermission(PermissionId),

    /// The underlying storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Persistence collaborator for the access-control engine.
///
/// Read operations return snapshots; write operations are single-shot and
/// synchronous. `replace_user_roles` must be atomic: a concurrent reader
/// sees either the old role set or the new one, never an in-between state.
pub trait AccessStore: Send + Sync {
    /// Permission catalog, ordered by (resource, action).
    fn list_permissions(&self) -> Result<Vec<Permission>, AccessStoreError>;

    /// Role store, ordered by name.
    fn list_roles(&self) -> Result<Vec<Role>, AccessStoreError>;

    /// Bindings of one role.
    fn list_role_permissions(&self, role_id: RoleId) -> Result<Vec<RolePermission>, AccessStoreError>;

    /// Bindings of several roles at once (for resolution).
    fn list_role_permissions_for_roles(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<RolePermission>, AccessStoreError>;

    /// The set of roles a user currently holds.
    fn list_user_roles(&self, user_id: UserId) -> Result<HashSet<RoleId>, AccessStoreError>;

    /// Replace a user's role set wholesale.
    ///
    /// Fails with [`AccessStoreError::UnknownRole`] if any id is absent from
    /// the role store; nothing partial is committed in that case.
    fn replace_user_roles(
        &self,
        user_id: UserId,
        role_ids: HashSet<RoleId>,
    ) -> Result<(), AccessStoreError>;

    /// All overrides of one user.
    fn get_user_overrides(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserPermissionOverride>, AccessStoreError>;

    /// Create or replace one override row.
    fn upsert_override(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
        effect: Effect,
    ) -> Result<(), AccessStoreError>;

    /// Delete one override row. Idempotent: deleting an absent row succeeds.
    fn delete_override(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> Result<(), AccessStoreError>;
}

/// Snapshot the store and resolve one user's effective permissions.
///
/// Convenience for callers that hold a store rather than pre-fetched
/// snapshots. Each call re-reads every input, so mutations made since the
/// previous call are always reflected.
pub fn resolve_user(
    store: &dyn AccessStore,
    user_id: UserId,
) -> Result<Vec<EffectivePermission>, AccessStoreError> {
    let catalog = Catalog::new(store.list_permissions()?);
    let roles = store.list_roles()?;
    let assigned = store.list_user_roles(user_id)?;
    let assigned_vec: Vec<RoleId> = assigned.iter().copied().collect();
    let bindings = store.list_role_permissions_for_roles(&assigned_vec)?;
    let overrides = store.get_user_overrides(user_id)?;

    Ok(resolve(user_id, &assigned, &roles, &bindings, &overrides, &catalog))
}
