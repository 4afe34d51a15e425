//! Permission catalog and role reference data.
//!
//! The catalog is the single source of truth for which (resource, action)
//! pairs exist. Bindings and overrides reference catalog entries by surrogate
//! id; rows pointing at an id absent from the catalog are orphans and are
//! excluded from resolution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use opshub_core::{PermissionId, RoleId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Effect
// ─────────────────────────────────────────────────────────────────────────────

/// Polarity of a binding or override.
///
/// This is a closed two-valued enum: there is no storable "unset" value.
/// Absence of a row is the unset state. A malformed effect in stored data
/// fails serde deserialization at the data-access boundary and never reaches
/// the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn is_allow(self) -> bool {
        matches!(self, Effect::Allow)
    }
}

impl core::fmt::Display for Effect {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reference data
// ─────────────────────────────────────────────────────────────────────────────

/// One controllable capability: a (resource, action) pair.
///
/// The (resource, action) pair is the natural unique key; `id` is a stable
/// surrogate used by bindings and overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub resource: String,
    pub action: String,
    pub description: String,
}

impl Permission {
    pub fn new(
        id: PermissionId,
        resource: impl Into<String>,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            resource: resource.into(),
            action: action.into(),
            description: description.into(),
        }
    }

    /// Natural key, used for ordering and display ("resource.action").
    pub fn key(&self) -> (&str, &str) {
        (&self.resource, &self.action)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}

/// A named bundle of permission effects assignable to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Declared effect of one role for one permission.
///
/// At most one row exists per (role_id, permission_id); a second write for
/// the same pair replaces the prior effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
    pub effect: Effect,
}

/// Per-user exception that supersedes every role-derived effect.
///
/// At most one row exists per (user_id, permission_id); absence means
/// "no override".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissionOverride {
    pub user_id: UserId,
    pub permission_id: PermissionId,
    pub effect: Effect,
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Indexed, immutable snapshot of the permission catalog.
///
/// Entries are held sorted by (resource, action) for deterministic display
/// and resolver output order.
#[derive(Debug, Clone)]
pub struct Catalog {
    permissions: Vec<Permission>,
    by_id: HashMap<PermissionId, usize>,
}

impl Catalog {
    pub fn new(mut permissions: Vec<Permission>) -> Self {
        permissions.sort_by(|a, b| a.key().cmp(&b.key()));
        let by_id = permissions
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, i))
            .collect();
        Self { permissions, by_id }
    }

    pub fn contains(&self, id: PermissionId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn get(&self, id: PermissionId) -> Option<&Permission> {
        self.by_id.get(&id).map(|&i| &self.permissions[i])
    }

    /// Entries in (resource, action) order.
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
