//! Authorizer - 다른 subject 대신 권한/역할을 변경할 수 있는지 확인
//!
//! `Warden::acting_as(actor)` 경로에서만 호출된다. 거부는 `AuthorizationDenied`.

use crate::context::ContextInput;
use crate::engine::PermissionEngine;
use std::sync::Arc;
use tracing::debug;
use warden_foundation::{AuthorizationSettings, OwnerKey, Result, SubjectRef};

/// 권한 관리 capability 확인
pub trait Authorizer: Send + Sync {
    /// 권한/역할 관리 자체가 가능한지
    fn can_manage(&self, actor: &SubjectRef) -> Result<bool>;

    fn can_assign_permission(
        &self,
        actor: &SubjectRef,
        _target: &OwnerKey,
        _permission: Option<&str>,
    ) -> Result<bool> {
        self.can_manage(actor)
    }

    fn can_revoke_permission(&self, actor: &SubjectRef, _target: &OwnerKey) -> Result<bool> {
        self.can_manage(actor)
    }

    fn can_assign_role(
        &self,
        actor: &SubjectRef,
        _target: &OwnerKey,
        _role: Option<&str>,
    ) -> Result<bool> {
        self.can_manage(actor)
    }

    fn can_revoke_role(&self, actor: &SubjectRef, _target: &OwnerKey) -> Result<bool> {
        self.can_manage(actor)
    }
}

/// 모두 허용
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn can_manage(&self, _actor: &SubjectRef) -> Result<bool> {
        Ok(true)
    }
}

/// 설정 기반 authorizer
///
/// - `enabled = false` 면 모두 허용
/// - super-admin 권한 또는 super-admin 역할 (전역 범위) 을 가지면 관리 가능
/// - restrict 옵션이 켜져 있으면 actor 가 가진 권한/역할만 부여 가능
pub struct PolicyAuthorizer {
    settings: AuthorizationSettings,
    engine: Arc<PermissionEngine>,
}

impl PolicyAuthorizer {
    pub fn new(settings: AuthorizationSettings, engine: Arc<PermissionEngine>) -> Self {
        Self { settings, engine }
    }

    pub fn settings(&self) -> &AuthorizationSettings {
        &self.settings
    }
}

impl Authorizer for PolicyAuthorizer {
    fn can_manage(&self, actor: &SubjectRef) -> Result<bool> {
        if !self.settings.enabled {
            return Ok(true);
        }

        if self
            .engine
            .can(actor, &self.settings.super_admin_permission, ContextInput::Global)?
        {
            return Ok(true);
        }

        let allowed = self
            .engine
            .has_role(actor, &self.settings.super_admin_role, ContextInput::Global)?;
        if !allowed {
            debug!(actor = %actor, "Actor cannot manage permissions");
        }
        Ok(allowed)
    }

    fn can_assign_permission(
        &self,
        actor: &SubjectRef,
        _target: &OwnerKey,
        permission: Option<&str>,
    ) -> Result<bool> {
        if !self.can_manage(actor)? {
            return Ok(false);
        }
        if !self.settings.enabled || !self.settings.restrict_permission_assignment {
            return Ok(true);
        }
        match permission {
            Some(permission) => self.engine.can(actor, permission, ContextInput::Global),
            None => Ok(true),
        }
    }

    fn can_assign_role(
        &self,
        actor: &SubjectRef,
        _target: &OwnerKey,
        role: Option<&str>,
    ) -> Result<bool> {
        if !self.can_manage(actor)? {
            return Ok(false);
        }
        if !self.settings.enabled || !self.settings.restrict_role_assignment {
            return Ok(true);
        }
        match role {
            Some(role) => self.engine.has_role(actor, role, ContextInput::Global),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_foundation::{
        GrantHolder, GrantKind, NewPermission, NewRole, RbacStore, SqliteStore,
    };

    fn engine() -> Arc<PermissionEngine> {
        let store: Arc<dyn RbacStore> =
            Arc::new(SqliteStore::in_memory().expect("Failed to create storage"));
        Arc::new(PermissionEngine::new(store, None))
    }

    fn grant(engine: &PermissionEngine, subject: &SubjectRef, permission: &str) {
        let store = engine.store();
        let permission = match store.permission_by_name(permission).expect("lookup") {
            Some(p) => p,
            None => store
                .insert_permission(&NewPermission::new(permission))
                .expect("insert"),
        };
        store
            .attach(GrantKind::Permission, &subject.owner_key(), permission.id.0, None)
            .expect("attach");
    }

    #[test]
    fn test_allow_all() {
        let actor = SubjectRef::new("user", "1");
        let target = OwnerKey::new("user", "2");
        assert!(AllowAll.can_manage(&actor).expect("manage"));
        assert!(AllowAll.can_revoke_role(&actor, &target).expect("revoke"));
    }

    #[test]
    fn test_super_admin_permission() {
        let engine = engine();
        let admin = SubjectRef::new("user", "admin");
        let nobody = SubjectRef::new("user", "nobody");
        grant(&engine, &admin, "warden.manage");

        let authorizer = PolicyAuthorizer::new(AuthorizationSettings::default(), engine);
        assert!(authorizer.can_manage(&admin).expect("manage"));
        assert!(!authorizer.can_manage(&nobody).expect("manage"));
        assert!(!authorizer
            .can_assign_permission(&nobody, &OwnerKey::new("user", "2"), Some("x"))
            .expect("assign"));
    }

    #[test]
    fn test_super_admin_role() {
        let engine = engine();
        let admin = SubjectRef::new("user", "admin");
        let role = engine
            .store()
            .insert_role(&NewRole::new("super-admin"))
            .expect("insert");
        engine
            .store()
            .attach(GrantKind::Role, &admin.owner_key(), role.id.0, None)
            .expect("attach");

        let authorizer = PolicyAuthorizer::new(AuthorizationSettings::default(), engine);
        assert!(authorizer.can_manage(&admin).expect("manage"));
    }

    #[test]
    fn test_disabled_allows_everyone() {
        let settings = AuthorizationSettings {
            enabled: false,
            ..Default::default()
        };
        let authorizer = PolicyAuthorizer::new(settings, engine());
        assert!(authorizer
            .can_manage(&SubjectRef::new("user", "anyone"))
            .expect("manage"));
    }

    #[test]
    fn test_restricted_assignment() {
        let engine = engine();
        let admin = SubjectRef::new("user", "admin");
        grant(&engine, &admin, "warden.manage");
        grant(&engine, &admin, "posts.edit");
        engine
            .store()
            .insert_permission(&NewPermission::new("posts.delete"))
            .expect("insert");

        let settings = AuthorizationSettings {
            restrict_permission_assignment: true,
            ..Default::default()
        };
        let authorizer = PolicyAuthorizer::new(settings, engine);
        let target = OwnerKey::new("user", "2");

        assert!(authorizer
            .can_assign_permission(&admin, &target, Some("posts.edit"))
            .expect("assign"));
        assert!(!authorizer
            .can_assign_permission(&admin, &target, Some("posts.delete"))
            .expect("assign"));
        assert!(authorizer.can_revoke_permission(&admin, &target).expect("revoke"));
    }
}
