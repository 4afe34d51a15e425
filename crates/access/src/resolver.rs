//! Effective permission resolution.
//!
//! The resolver combines catalog, role bindings, role assignments and
//! per-user overrides into exactly one decision per catalog entry. It is a
//! total function: every catalog permission yields a decision, and the
//! fallback is always deny.
//!
//! # Invariants
//! - A per-user override short-circuits role evaluation entirely.
//! - At the role layer, deny overrides allow across all assigned roles.
//! - No override and no matching binding means explicit default deny.
//! - Iteration order over roles/bindings never affects the decision; the
//!   role name quoted in `details` is informational only.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use opshub_core::{PermissionId, RoleId, UserId};

use crate::catalog::{Catalog, Effect, Role, RolePermission, UserPermissionOverride};

// ─────────────────────────────────────────────────────────────────────────────
// Decision model
// ─────────────────────────────────────────────────────────────────────────────

/// Which precedence tier produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// A per-user override decided (allow or deny).
    UserOverride,
    /// Role bindings decided (allow or deny).
    Role,
    /// Nothing matched; the default-deny fallback applied.
    Denied,
}

/// The final allow/deny decision for one (user, permission) pair.
///
/// Derived on demand, never persisted; recompute after any mutation of the
/// inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePermission {
    pub resource: String,
    pub action: String,
    pub allowed: bool,
    pub source: DecisionSource,
    pub details: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve the effective permission set for one user.
///
/// Pure and synchronous: no I/O, no interior mutation, safe to call
/// concurrently over snapshots. Returns exactly one [`EffectivePermission`]
/// per catalog entry, in (resource, action) order.
///
/// Bindings and overrides referencing a permission id absent from the
/// catalog are orphans: they are skipped (never surfaced, never an error)
/// and logged for administrative cleanup. Use [`audit_integrity`] to collect
/// them programmatically.
pub fn resolve(
    user_id: UserId,
    assigned_roles: &HashSet<RoleId>,
    roles: &[Role],
    bindings: &[RolePermission],
    overrides: &[UserPermissionOverride],
    catalog: &Catalog,
) -> Vec<EffectivePermission> {
    let role_names: HashMap<RoleId, &str> =
        roles.iter().map(|r| (r.id, r.name.as_str())).collect();

    // Index overrides and the user's relevant bindings up front; orphan rows
    // are dropped here so the per-permission loop sees only catalog-backed
    // input.
    let mut override_by_permission: HashMap<PermissionId, Effect> = HashMap::new();
    for o in overrides {
        if o.user_id != user_id {
            continue;
        }
        if !catalog.contains(o.permission_id) {
            warn!(
                user_id = %o.user_id,
                permission_id = %o.permission_id,
                "orphaned override references a permission absent from the catalog; skipping"
            );
            continue;
        }
        override_by_permission.insert(o.permission_id, o.effect);
    }

    let mut bindings_by_permission: HashMap<PermissionId, Vec<&RolePermission>> = HashMap::new();
    for b in bindings {
        if !assigned_roles.contains(&b.role_id) {
            continue;
        }
        if !catalog.contains(b.permission_id) {
            warn!(
                role_id = %b.role_id,
                permission_id = %b.permission_id,
                "orphaned role binding references a permission absent from the catalog; skipping"
            );
            continue;
        }
        bindings_by_permission.entry(b.permission_id).or_default().push(b);
    }

    catalog
        .iter()
        .map(|p| {
            // Tier 1: user override short-circuits everything.
            if let Some(effect) = override_by_permission.get(&p.id) {
                return EffectivePermission {
                    resource: p.resource.clone(),
                    action: p.action.clone(),
                    allowed: effect.is_allow(),
                    source: DecisionSource::UserOverride,
                    details: format!("User override: {effect}"),
                };
            }

            // Tier 2: role bindings, deny wins over allow.
            let matching: &[&RolePermission] = bindings_by_permission
                .get(&p.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let denier = matching.iter().find(|b| b.effect == Effect::Deny);
            if let Some(denied_by) = denier {
                return EffectivePermission {
                    resource: p.resource.clone(),
                    action: p.action.clone(),
                    allowed: false,
                    source: DecisionSource::Role,
                    details: format!("Denied by role: {}", display_role(&role_names, denied_by.role_id)),
                };
            }
            if let Some(allowed_by) = matching.first() {
                return EffectivePermission {
                    resource: p.resource.clone(),
                    action: p.action.clone(),
                    allowed: true,
                    source: DecisionSource::Role,
                    details: format!("Allowed by role: {}", display_role(&role_names, allowed_by.role_id)),
                };
            }

            // Tier 3: closed-world default deny.
            EffectivePermission {
                resource: p.resource.clone(),
                action: p.action.clone(),
                allowed: false,
                source: DecisionSource::Denied,
                details: "Default deny (no matching rules)".to_string(),
            }
        })
        .collect()
}

fn display_role(names: &HashMap<RoleId, &str>, id: RoleId) -> String {
    match names.get(&id) {
        Some(name) => (*name).to_string(),
        None => id.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Integrity audit
// ─────────────────────────────────────────────────────────────────────────────

/// Orphaned rows found against a catalog snapshot.
///
/// Orphans are excluded from resolution automatically; this report exists so
/// an administrative cleanup job can list and delete them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub orphan_bindings: Vec<RolePermission>,
    pub orphan_overrides: Vec<UserPermissionOverride>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_bindings.is_empty() && self.orphan_overrides.is_empty()
    }
}

/// Collect every binding/override row that references a permission id absent
/// from the catalog.
pub fn audit_integrity(
    bindings: &[RolePermission],
    overrides: &[UserPermissionOverride],
    catalog: &Catalog,
) -> IntegrityReport {
    IntegrityReport {
        orphan_bindings: bindings
            .iter()
            .filter(|b| !catalog.contains(b.permission_id))
            .copied()
            .collect(),
        orphan_overrides: overrides
            .iter()
            .filter(|o| !catalog.contains(o.permission_id))
            .copied()
            .collect(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
