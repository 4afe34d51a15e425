//! Role assignment editing.
//!
//! Saving a user's role set is a full replacement, never an incremental
//! add/remove: the stored assignment rows become exactly the requested set.
//! The store contract makes the swap atomic, so a concurrent resolution
//! never observes a transient empty role set.

use std::collections::HashSet;

use opshub_core::{DomainError, DomainResult, RoleId, UserId};

use crate::store::{AccessStore, AccessStoreError};

/// Editor for a user's role assignments.
pub struct RoleAssignmentEditor<'a> {
    store: &'a dyn AccessStore,
}

impl<'a> RoleAssignmentEditor<'a> {
    pub fn new(store: &'a dyn AccessStore) -> Self {
        Self { store }
    }

    /// Replace the user's role set with exactly `new_role_ids`.
    ///
    /// An empty set is valid: the user keeps any overrides, and everything
    /// else falls back to default deny. Referencing a role id absent from
    /// the role store rejects the whole operation; no partial assignment is
    /// committed.
    pub fn set_user_roles(
        &self,
        user_id: UserId,
        new_role_ids: HashSet<RoleId>,
    ) -> DomainResult<()> {
        let known: HashSet<RoleId> = self
            .store
            .list_roles()
            .map_err(store_failure)?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let unknown: Vec<String> = new_role_ids
            .iter()
            .filter(|id| !known.contains(id))
            .map(|id| id.to_string())
            .collect();
        if !unknown.is_empty() {
            return Err(DomainError::validation(format!(
                "unknown role ids: {}",
                unknown.join(", ")
            )));
        }

        // The store revalidates under its own lock; the pre-check above only
        // exists to report every offending id at once.
        self.store
            .replace_user_roles(user_id, new_role_ids)
            .map_err(|e| match e {
                AccessStoreError::UnknownRole(id) => {
                    DomainError::validation(format!("unknown role id: {id}"))
                }
                other => store_failure(other),
            })
    }
}

fn store_failure(e: AccessStoreError) -> DomainError {
    DomainError::conflict(format!("access store failure: {e}"))
}
