//! Staged override editing session.
//!
//! An administrator accumulates per-user override edits in memory and
//! commits them as one batch, or discards them. The session is a bounded,
//! keyed diff: one pending entry per permission id, last write wins within
//! the session. It is scoped to a single editing interaction and shares no
//! state across sessions.
//!
//! State machine: `Clean → Editing → Committing → Clean` on success,
//! `Committing → Editing` on failure (failed entries stay pending for
//! retry), `Editing → Clean` on discard.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use opshub_core::{DomainError, DomainResult, PermissionId, UserId};

use crate::catalog::{Catalog, Effect};
use crate::store::{AccessStore, AccessStoreError};

// ─────────────────────────────────────────────────────────────────────────────
// Session state
// ─────────────────────────────────────────────────────────────────────────────

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No pending changes.
    Clean,
    /// At least one pending change, not yet committed.
    Editing,
    /// A commit is in flight. Only observable from within commit itself;
    /// the session always leaves commit in `Clean` or `Editing`.
    Committing,
}

/// One staged change for one permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedChange {
    /// Create or replace the override with this effect.
    Set(Effect),
    /// Clear the override on commit (idempotent if none exists).
    Clear,
}

// ─────────────────────────────────────────────────────────────────────────────
// Commit outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a fully successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Permission ids whose staged change was applied, in the order they
    /// were written.
    pub applied: Vec<PermissionId>,
}

/// One staged entry that failed to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFailure {
    pub permission_id: PermissionId,
    pub reason: AccessStoreError,
}

/// Commit failed for at least one staged entry.
///
/// Carries the per-entry outcome so the caller can distinguish "partially
/// applied" (some `applied`, some `failures`) from "fully failed" (no
/// `applied`). Failed entries remain pending in the session; a later commit
/// retries only those.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} of {} staged override changes failed", .failures.len(), .failures.len() + .applied.len())]
pub struct CommitError {
    pub applied: Vec<PermissionId>,
    pub failures: Vec<CommitFailure>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory batch of not-yet-committed override changes for one user.
pub struct OverrideSession {
    user_id: UserId,
    catalog: Catalog,
    pending: HashMap<PermissionId, StagedChange>,
    state: SessionState,
}

impl OverrideSession {
    /// Open a session for one user against a catalog snapshot.
    ///
    /// The snapshot is what staged permission ids are validated against; a
    /// catalog edit made after the session opened is not seen until a new
    /// session is opened.
    pub fn new(user_id: UserId, catalog: Catalog) -> Self {
        Self {
            user_id,
            catalog,
            pending: HashMap::new(),
            state: SessionState::Clean,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Record one pending change, replacing any prior pending value for the
    /// same permission id.
    ///
    /// Referencing a permission id absent from the catalog is a validation
    /// error; the entry never enters the pending map.
    pub fn stage(&mut self, permission_id: PermissionId, change: StagedChange) -> DomainResult<()> {
        if !self.catalog.contains(permission_id) {
            return Err(DomainError::validation(format!(
                "unknown permission id: {permission_id}"
            )));
        }

        self.pending.insert(permission_id, change);
        self.state = SessionState::Editing;
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// View of the pending diff (one entry per permission id).
    pub fn pending(&self) -> &HashMap<PermissionId, StagedChange> {
        &self.pending
    }

    /// Drop every pending change without touching stored data.
    pub fn discard(&mut self) {
        self.pending.clear();
        self.state = SessionState::Clean;
    }

    /// Apply every pending change to the store.
    ///
    /// `Clear` deletes the override row (a no-op if absent); `Set` upserts
    /// it. Entries apply in permission-id order for deterministic retry
    /// behavior. Committing an empty session is a no-op.
    ///
    /// On any failure the successfully applied entries are removed from the
    /// pending map and the failed ones are retained, so the caller can fix
    /// the cause and commit again to retry exactly the failed subset.
    pub fn commit(&mut self, store: &dyn AccessStore) -> Result<CommitReport, CommitError> {
        if self.pending.is_empty() {
            self.state = SessionState::Clean;
            return Ok(CommitReport::default());
        }

        self.state = SessionState::Committing;

        let mut entries: Vec<(PermissionId, StagedChange)> =
            self.pending.iter().map(|(&id, &c)| (id, c)).collect();
        entries.sort_by_key(|(id, _)| *id);

        let mut applied = Vec::new();
        let mut failures = Vec::new();

        for (permission_id, change) in entries {
            let result = match change {
                StagedChange::Set(effect) => {
                    store.upsert_override(self.user_id, permission_id, effect)
                }
                StagedChange::Clear => store.delete_override(self.user_id, permission_id),
            };

            match result {
                Ok(()) => {
                    self.pending.remove(&permission_id);
                    applied.push(permission_id);
                }
                Err(reason) => {
                    warn!(
                        user_id = %self.user_id,
                        permission_id = %permission_id,
                        error = %reason,
                        "staged override change failed to apply"
                    );
                    failures.push(CommitFailure {
                        permission_id,
                        reason,
                    });
                }
            }
        }

        if failures.is_empty() {
            debug!(
                user_id = %self.user_id,
                applied = applied.len(),
                "override session committed"
            );
            self.state = SessionState::Clean;
            Ok(CommitReport { applied })
        } else {
            self.state = SessionState::Editing;
            Err(CommitError { applied, failures })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Permission, Role, RolePermission, UserPermissionOverride};
    use opshub_core::RoleId;
    use std::collections::HashSet;
    use std::sync::RwLock;

    /// Fake override store with per-permission failure injection.
    #[derive(Default)]
    struct FakeStore {
        overrides: RwLock<HashMap<(UserId, PermissionId), Effect>>,
        fail_on: RwLock<HashSet<PermissionId>>,
    }

    impl FakeStore {
        fn fail_on(&self, permission_id: PermissionId) {
            self.fail_on.write().unwrap().insert(permission_id);
        }

        fn heal(&self) {
            self.fail_on.write().unwrap().clear();
        }

        fn effect_of(&self, user_id: UserId, permission_id: PermissionId) -> Option<Effect> {
            self.overrides
                .read()
                .unwrap()
                .get(&(user_id, permission_id))
                .copied()
        }
    }

    impl AccessStore for FakeStore {
        fn list_permissions(&self) -> Result<Vec<Permission>, AccessStoreError> {
            Ok(Vec::new())
        }

        fn list_roles(&self) -> Result<Vec<Role>, AccessStoreError> {
            Ok(Vec::new())
        }

        fn list_role_permissions(
            &self,
            _role_id: RoleId,
        ) -> Result<Vec<RolePermission>, AccessStoreError> {
            Ok(Vec::new())
        }

        fn list_role_permissions_for_roles(
            &self,
            _role_ids: &[RoleId],
        ) -> Result<Vec<RolePermission>, AccessStoreError> {
            Ok(Vec::new())
        }

        fn list_user_roles(&self, _user_id: UserId) -> Result<HashSet<RoleId>, AccessStoreError> {
            Ok(HashSet::new())
        }

        fn replace_user_roles(
            &self,
            _user_id: UserId,
            _role_ids: HashSet<RoleId>,
        ) -> Result<(), AccessStoreError> {
            Ok(())
        }

        fn get_user_overrides(
            &self,
            user_id: UserId,
        ) -> Result<Vec<UserPermissionOverride>, AccessStoreError> {
            Ok(self
                .overrides
                .read()
                .unwrap()
                .iter()
                .filter(|((u, _), _)| *u == user_id)
                .map(|((user_id, permission_id), effect)| UserPermissionOverride {
                    user_id: *user_id,
                    permission_id: *permission_id,
                    effect: *effect,
                })
                .collect())
        }

        fn upsert_override(
            &self,
            user_id: UserId,
            permission_id: PermissionId,
            effect: Effect,
        ) -> Result<(), AccessStoreError> {
            if self.fail_on.read().unwrap().contains(&permission_id) {
                return Err(AccessStoreError::Storage("injected write failure".into()));
            }
            self.overrides
                .write()
                .unwrap()
                .insert((user_id, permission_id), effect);
            Ok(())
        }

        fn delete_override(
            &self,
            user_id: UserId,
            permission_id: PermissionId,
        ) -> Result<(), AccessStoreError> {
            if self.fail_on.read().unwrap().contains(&permission_id) {
                return Err(AccessStoreError::Storage("injected write failure".into()));
            }
            self.overrides
                .write()
                .unwrap()
                .remove(&(user_id, permission_id));
            Ok(())
        }
    }

    fn catalog_of(n: usize) -> (Catalog, Vec<PermissionId>) {
        let ids: Vec<PermissionId> = (0..n).map(|_| PermissionId::new()).collect();
        let perms = ids
            .iter()
            .enumerate()
            .map(|(i, &id)| Permission::new(id, "articles", format!("action-{i}"), ""))
            .collect();
        (Catalog::new(perms), ids)
    }

    #[test]
    fn staging_moves_clean_to_editing_and_restaging_overwrites() {
        let (catalog, ids) = catalog_of(1);
        let mut session = OverrideSession::new(UserId::new(), catalog);
        assert_eq!(session.state(), SessionState::Clean);

        session.stage(ids[0], StagedChange::Set(Effect::Allow)).unwrap();
        assert_eq!(session.state(), SessionState::Editing);
        assert_eq!(session.pending_count(), 1);

        // Last write wins; no history accumulates.
        session.stage(ids[0], StagedChange::Set(Effect::Deny)).unwrap();
        assert_eq!(session.pending_count(), 1);
        assert_eq!(
            session.pending()[&ids[0]],
            StagedChange::Set(Effect::Deny)
        );
    }

    #[test]
    fn staging_unknown_permission_is_rejected() {
        let (catalog, _) = catalog_of(1);
        let mut session = OverrideSession::new(UserId::new(), catalog);

        let result = session.stage(PermissionId::new(), StagedChange::Set(Effect::Allow));
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(session.pending_count(), 0);
        assert_eq!(session.state(), SessionState::Clean);
    }

    #[test]
    fn commit_applies_sets_and_clears() {
        let (catalog, ids) = catalog_of(2);
        let user = UserId::new();
        let store = FakeStore::default();
        // Pre-existing override that the session will clear.
        store.upsert_override(user, ids[1], Effect::Deny).unwrap();

        let mut session = OverrideSession::new(user, catalog);
        session.stage(ids[0], StagedChange::Set(Effect::Allow)).unwrap();
        session.stage(ids[1], StagedChange::Clear).unwrap();

        let report = session.commit(&store).unwrap();
        assert_eq!(report.applied.len(), 2);
        assert_eq!(session.state(), SessionState::Clean);
        assert_eq!(session.pending_count(), 0);

        assert_eq!(store.effect_of(user, ids[0]), Some(Effect::Allow));
        assert_eq!(store.effect_of(user, ids[1]), None);
    }

    #[test]
    fn committing_empty_session_is_a_noop() {
        let (catalog, _) = catalog_of(1);
        let store = FakeStore::default();
        let mut session = OverrideSession::new(UserId::new(), catalog);

        let report = session.commit(&store).unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(session.state(), SessionState::Clean);
    }

    #[test]
    fn clearing_an_absent_override_commits_cleanly() {
        let (catalog, ids) = catalog_of(1);
        let store = FakeStore::default();
        let mut session = OverrideSession::new(UserId::new(), catalog);

        session.stage(ids[0], StagedChange::Clear).unwrap();
        let report = session.commit(&store).unwrap();
        assert_eq!(report.applied, vec![ids[0]]);
    }

    #[test]
    fn discard_clears_pending_without_touching_the_store() {
        let (catalog, ids) = catalog_of(1);
        let user = UserId::new();
        let store = FakeStore::default();
        store.upsert_override(user, ids[0], Effect::Deny).unwrap();

        let mut session = OverrideSession::new(user, catalog);
        session.stage(ids[0], StagedChange::Clear).unwrap();
        session.discard();

        assert_eq!(session.state(), SessionState::Clean);
        assert_eq!(session.pending_count(), 0);
        assert_eq!(store.effect_of(user, ids[0]), Some(Effect::Deny));
    }

    #[test]
    fn partial_failure_reports_per_entry_and_retains_failed_for_retry() {
        let (catalog, ids) = catalog_of(3);
        let user = UserId::new();
        let store = FakeStore::default();
        store.fail_on(ids[1]);

        let mut session = OverrideSession::new(user, catalog);
        for &id in &ids {
            session.stage(id, StagedChange::Set(Effect::Allow)).unwrap();
        }

        let err = session.commit(&store).unwrap_err();
        assert_eq!(err.applied.len(), 2);
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].permission_id, ids[1]);
        assert!(matches!(err.failures[0].reason, AccessStoreError::Storage(_)));

        // Only the failed entry is still pending.
        assert_eq!(session.state(), SessionState::Editing);
        assert_eq!(session.pending_count(), 1);
        assert!(session.pending().contains_key(&ids[1]));

        // Retry applies exactly the failed subset once the store recovers.
        store.heal();
        let report = session.commit(&store).unwrap();
        assert_eq!(report.applied, vec![ids[1]]);
        assert_eq!(session.state(), SessionState::Clean);
        assert_eq!(store.effect_of(user, ids[1]), Some(Effect::Allow));
    }

    #[test]
    fn fully_failed_commit_keeps_everything_pending() {
        let (catalog, ids) = catalog_of(2);
        let store = FakeStore::default();
        store.fail_on(ids[0]);
        store.fail_on(ids[1]);

        let mut session = OverrideSession::new(UserId::new(), catalog);
        session.stage(ids[0], StagedChange::Set(Effect::Allow)).unwrap();
        session.stage(ids[1], StagedChange::Clear).unwrap();

        let err = session.commit(&store).unwrap_err();
        assert!(err.applied.is_empty());
        assert_eq!(err.failures.len(), 2);
        assert_eq!(session.pending_count(), 2);
        assert_eq!(session.state(), SessionState::Editing);
    }
}
