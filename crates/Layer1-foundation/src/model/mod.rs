//! Model - RBAC 데이터 모델
//!
//! - `entity.rs` - Permission, Role, Context, typed IDs
//! - `holder.rs` - SubjectRef, OwnerKey, GrantHolder
//! - `grant.rs` - GrantKind, ContextScope, SyncDelta

mod entity;
mod grant;
mod holder;

pub use entity::{Context, ContextId, NewPermission, NewRole, Permission, PermissionId, Role, RoleId};
pub use grant::{ContextScope, GrantKind, SyncDelta};
pub use holder::{EntityRef, GrantHolder, OwnerKey, SubjectRef, ROLE_OWNER_TYPE};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_delta_compute() {
        let delta = SyncDelta::compute(&[1, 2, 3], &[2, 3, 4, 4, 5]);
        assert_eq!(delta.attached, vec![4, 5]);
        assert_eq!(delta.detached, vec![1]);
        assert!(!delta.is_empty());

        let noop = SyncDelta::compute(&[1, 2], &[2, 1]);
        assert!(noop.is_empty());
    }

    #[test]
    fn test_owner_key_for_role() {
        let key = RoleId(42).owner_key();
        assert!(key.is_role());
        assert_eq!(key.role_id(), Some(RoleId(42)));
        assert_eq!(key.subject(), None);
    }

    #[test]
    fn test_owner_key_for_subject() {
        let subject = SubjectRef::new("user", "7");
        let key = subject.owner_key();
        assert!(!key.is_role());
        assert_eq!(key.role_id(), None);
        assert_eq!(key.subject(), Some(subject));
    }

    #[test]
    fn test_context_scope_matches() {
        assert!(ContextScope::unscoped().matches(None));
        assert!(!ContextScope::unscoped().matches(Some(ContextId(1))));
        assert!(ContextScope::Any.matches(Some(ContextId(1))));
        assert!(ContextScope::Exact(Some(ContextId(1))).matches(Some(ContextId(1))));
    }
}
