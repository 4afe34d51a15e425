//! `opshub-access` — pure role-based access control engine.
//!
//! This crate decides, for an identified user and a (resource, action)
//! permission, whether that action is allowed. It is intentionally decoupled
//! from HTTP and storage: persistence is an [`AccessStore`] collaborator, and
//! the resolver itself is a pure function over immutable snapshots.
//!
//! Precedence, highest first:
//! 1. per-user override (allow or deny) — short-circuits role evaluation;
//! 2. role bindings, with deny overriding allow across all assigned roles;
//! 3. default deny when nothing matches.

pub mod assignment;
pub mod catalog;
pub mod resolver;
pub mod session;
pub mod store;

pub use assignment::RoleAssignmentEditor;
pub use catalog::{Catalog, Effect, Permission, Role, RolePermission, UserPermissionOverride};
pub use resolver::{audit_integrity, resolve, DecisionSource, EffectivePermission, IntegrityReport};
pub use session::{CommitError, CommitFailure, CommitReport, OverrideSession, SessionState, StagedChange};
pub use store::{resolve_user, AccessStore, AccessStoreError};
