//! In-memory access store for tests, dev, and embedded deployments.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use opshub_access::{
    AccessStore, AccessStoreError, Effect, Permission, Role, RolePermission,
    UserPermissionOverride,
};
use opshub_core::{PermissionId, RoleId, UserId};

#[derive(Debug, Clone)]
struct OverrideRow {
    effect: Effect,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    permissions: Vec<Permission>,
    permission_ids: HashSet<PermissionId>,
    roles: Vec<Role>,
    role_ids: HashSet<RoleId>,
    // Keyed by (role, permission): a second write for the same pair
    // replaces, never appends.
    bindings: HashMap<(RoleId, PermissionId), Effect>,
    user_roles: HashMap<UserId, HashSet<RoleId>>,
    overrides: HashMap<(UserId, PermissionId), OverrideRow>,
}

/// In-memory [`AccessStore`].
///
/// All mutations take the write lock for their whole read-modify-write
/// sequence, so every store call is atomic: a concurrent reader sees either
/// the state before a role-set replacement or after it, never a transient
/// empty set. There is no cross-call conflict detection; two administrators
/// saving the same user race and the last write wins.
#[derive(Debug)]
pub struct InMemoryAccessStore {
    inner: RwLock<State>,
}

impl InMemoryAccessStore {
    /// Create a store seeded with reference data (catalog + roles).
    pub fn seeded(permissions: Vec<Permission>, roles: Vec<Role>) -> Self {
        let mut state = State {
            permission_ids: permissions.iter().map(|p| p.id).collect(),
            role_ids: roles.iter().map(|r| r.id).collect(),
            permissions,
            roles,
            ..State::default()
        };
        state.permissions.sort_by(|a, b| a.key().cmp(&b.key()));
        state.roles.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            inner: RwLock::new(state),
        }
    }

    pub fn arc(permissions: Vec<Permission>, roles: Vec<Role>) -> Arc<Self> {
        Arc::new(Self::seeded(permissions, roles))
    }

    /// Declare one role's effect for one permission, replacing any prior
    /// effect for the same (role, permission) pair.
    pub fn set_role_binding(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
        effect: Effect,
    ) -> Result<(), AccessStoreError> {
        let mut state = self.inner.write().unwrap();
        if !state.role_ids.contains(&role_id) {
            return Err(AccessStoreError::UnknownRole(role_id));
        }
        if !state.permission_ids.contains(&permission_id) {
            return Err(AccessStoreError::UnknownPermission(permission_id));
        }
        state.bindings.insert((role_id, permission_id), effect);
        Ok(())
    }

    /// Remove a permission from the catalog without touching bindings or
    /// overrides that reference it. The rows left behind become orphans,
    /// excluded from resolution and reported by the integrity audit.
    pub fn retire_permission(&self, permission_id: PermissionId) {
        let mut state = self.inner.write().unwrap();
        state.permissions.retain(|p| p.id != permission_id);
        state.permission_ids.remove(&permission_id);
    }

    /// Every binding row, including orphans (for the integrity audit).
    pub fn all_role_permissions(&self) -> Vec<RolePermission> {
        let state = self.inner.read().unwrap();
        state
            .bindings
            .iter()
            .map(|(&(role_id, permission_id), &effect)| RolePermission {
                role_id,
                permission_id,
                effect,
            })
            .collect()
    }

    /// When an override row was last written (administrative cleanup views).
    pub fn override_updated_at(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> Option<DateTime<Utc>> {
        let state = self.inner.read().unwrap();
        state
            .overrides
            .get(&(user_id, permission_id))
            .map(|row| row.updated_at)
    }
}

impl AccessStore for InMemoryAccessStore {
    fn list_permissions(&self) -> Result<Vec<Permission>, AccessStoreError> {
        Ok(self.inner.read().unwrap().permissions.clone())
    }

    fn list_roles(&self) -> Result<Vec<Role>, AccessStoreError> {
        Ok(self.inner.read().unwrap().roles.clone())
    }

    fn list_role_permissions(
        &self,
        role_id: RoleId,
    ) -> Result<Vec<RolePermission>, AccessStoreError> {
        self.list_role_permissions_for_roles(&[role_id])
    }

    fn list_role_permissions_for_roles(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<RolePermission>, AccessStoreError> {
        let wanted: HashSet<RoleId> = role_ids.iter().copied().collect();
        let state = self.inner.read().unwrap();
        Ok(state
            .bindings
            .iter()
            .filter(|((role_id, _), _)| wanted.contains(role_id))
            .map(|(&(role_id, permission_id), &effect)| RolePermission {
                role_id,
                permission_id,
                effect,
            })
            .collect())
    }

    fn list_user_roles(&self, user_id: UserId) -> Result<HashSet<RoleId>, AccessStoreError> {
        let state = self.inner.read().unwrap();
        Ok(state.user_roles.get(&user_id).cloned().unwrap_or_default())
    }

    fn replace_user_roles(
        &self,
        user_id: UserId,
        role_ids: HashSet<RoleId>,
    ) -> Result<(), AccessStoreError> {
        let mut state = self.inner.write().unwrap();

        // Validate before mutating; the whole replacement is one swap under
        // the write lock.
        for role_id in &role_ids {
            if !state.role_ids.contains(role_id) {
                return Err(AccessStoreError::UnknownRole(*role_id));
            }
        }

        if role_ids.is_empty() {
            state.user_roles.remove(&user_id);
        } else {
            state.user_roles.insert(user_id, role_ids);
        }
        Ok(())
    }

    fn get_user_overrides(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserPermissionOverride>, AccessStoreError> {
        let state = self.inner.read().unwrap();
        Ok(state
            .overrides
            .iter()
            .filter(|((u, _), _)| *u == user_id)
            .map(|(&(user_id, permission_id), row)| UserPermissionOverride {
                user_id,
                permission_id,
                effect: row.effect,
            })
            .collect())
    }

    fn upsert_override(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
        effect: Effect,
    ) -> Result<(), AccessStoreError> {
        let mut state = self.inner.write().unwrap();
        if !state.permission_ids.contains(&permission_id) {
            return Err(AccessStoreError::UnknownPermission(permission_id));
        }
        state.overrides.insert(
            (user_id, permission_id),
            OverrideRow {
                effect,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn delete_override(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> Result<(), AccessStoreError> {
        let mut state = self.inner.write().unwrap();
        state.overrides.remove(&(user_id, permission_id));
        Ok(())
    }
}
