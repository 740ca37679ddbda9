//! Permission Resolution Engine - "subject 가 context 안에서 X 를 할 수 있는가?"
//!
//! 유효 권한 = 직접 권한 ∪ (직접 역할 + 하위 역할 전체) 가 가진 권한
//!
//! - 직접 역할은 역할의 context 가 조회 context 와 정확히 같아야 한다
//! - 권한 연결도 context 가 정확히 일치해야 한다 (None 은 "모든 context" 가 아님)
//! - 존재하지 않는 권한 이름은 에러가 아니라 false
//!
//! `can` 결과는 `ResolutionCache` 에 저장될 수 있다. 쓰기 경로가 무효화를 담당한다.

use crate::context::{ContextInput, ContextResolver};
use crate::hierarchy::HierarchyResolver;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;
use warden_foundation::{
    CacheStats, ContextId, ContextScope, GrantHolder, GrantKind, OwnerKey, Permission,
    RbacStore, ResolutionCache, Result, Role, SubjectRef,
};

/// 권한 판정 엔진
pub struct PermissionEngine {
    store: Arc<dyn RbacStore>,
    contexts: ContextResolver,
    hierarchy: HierarchyResolver,
    cache: Option<ResolutionCache>,
}

impl PermissionEngine {
    pub fn new(store: Arc<dyn RbacStore>, cache: Option<ResolutionCache>) -> Self {
        Self {
            contexts: ContextResolver::new(store.clone()),
            hierarchy: HierarchyResolver::new(store.clone()),
            store,
            cache,
        }
    }

    pub fn store(&self) -> &Arc<dyn RbacStore> {
        &self.store
    }

    pub fn contexts(&self) -> &ContextResolver {
        &self.contexts
    }

    pub fn hierarchy(&self) -> &HierarchyResolver {
        &self.hierarchy
    }

    pub fn resolve_context(&self, context: impl Into<ContextInput>) -> Result<Option<ContextId>> {
        self.contexts.resolve(&context.into())
    }

    // ========================================================================
    // Permission checks
    // ========================================================================

    pub fn can(
        &self,
        subject: &SubjectRef,
        permission: &str,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.resolve_context(context)?;
        self.can_in(subject, permission, context_id)
    }

    /// 이미 해석된 context 로 판정
    pub fn can_in(
        &self,
        subject: &SubjectRef,
        permission: &str,
        context_id: Option<ContextId>,
    ) -> Result<bool> {
        match &self.cache {
            Some(cache) => {
                let key = cache.key(subject, permission, context_id);
                cache.get_or_try_insert_with(key, || self.evaluate(subject, permission, context_id))
            }
            None => self.evaluate(subject, permission, context_id),
        }
    }

    pub fn can_any(
        &self,
        subject: &SubjectRef,
        permissions: &[&str],
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.resolve_context(context)?;
        for permission in permissions {
            if self.can_in(subject, permission, context_id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 빈 목록이면 true
    pub fn can_all(
        &self,
        subject: &SubjectRef,
        permissions: &[&str],
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.resolve_context(context)?;
        for permission in permissions {
            if !self.can_in(subject, permission, context_id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn evaluate(
        &self,
        subject: &SubjectRef,
        permission: &str,
        context_id: Option<ContextId>,
    ) -> Result<bool> {
        let Some(permission) = self.store.permission_by_name(permission)? else {
            trace!(permission, "Unknown permission resolves to false");
            return Ok(false);
        };

        let scope = ContextScope::Exact(context_id);
        let owner = subject.owner_key();

        if self
            .store
            .exists(GrantKind::Permission, &owner, permission.id.0, scope)?
        {
            return Ok(true);
        }

        let roles = self.expanded_roles(&owner, context_id)?;
        if roles.is_empty() {
            return Ok(false);
        }

        let holders: Vec<OwnerKey> = roles.iter().map(|r| r.owner_key()).collect();
        let granted = self
            .store
            .permissions_held(&holders, scope)?
            .iter()
            .any(|p| p.id == permission.id);

        trace!(
            subject = %subject,
            permission = %permission.name,
            context_id = ?context_id,
            roles = roles.len(),
            granted,
            "Permission evaluated through roles"
        );
        Ok(granted)
    }

    // ========================================================================
    // Effective sets
    // ========================================================================

    /// 직접 권한 ∪ 역할 경유 권한 (id 기준 중복 제거)
    pub fn permissions_for(
        &self,
        subject: &SubjectRef,
        context: impl Into<ContextInput>,
    ) -> Result<Vec<Permission>> {
        let context_id = self.resolve_context(context)?;
        let owner = subject.owner_key();

        let mut holders = vec![owner.clone()];
        holders.extend(
            self.expanded_roles(&owner, context_id)?
                .iter()
                .map(|r| r.owner_key()),
        );

        let mut seen = HashSet::new();
        Ok(self
            .store
            .permissions_held(&holders, ContextScope::Exact(context_id))?
            .into_iter()
            .filter(|p| seen.insert(p.id))
            .collect())
    }

    /// 직접 역할 ∪ 하위 역할 전체
    pub fn roles_for(
        &self,
        subject: &SubjectRef,
        context: impl Into<ContextInput>,
    ) -> Result<Vec<Role>> {
        let context_id = self.resolve_context(context)?;
        self.expanded_roles(&subject.owner_key(), context_id)
    }

    fn expanded_roles(&self, owner: &OwnerKey, context_id: Option<ContextId>) -> Result<Vec<Role>> {
        let direct = self
            .store
            .roles_held(owner, ContextScope::Exact(context_id))?;
        self.hierarchy.expand(&direct)
    }

    // ========================================================================
    // Direct grants
    // ========================================================================

    pub fn direct_permissions(
        &self,
        subject: &SubjectRef,
        context: impl Into<ContextInput>,
    ) -> Result<Vec<Permission>> {
        let context_id = self.resolve_context(context)?;
        self.store.permissions_held(
            &[subject.owner_key()],
            ContextScope::Exact(context_id),
        )
    }

    pub fn direct_roles(
        &self,
        subject: &SubjectRef,
        context: impl Into<ContextInput>,
    ) -> Result<Vec<Role>> {
        let context_id = self.resolve_context(context)?;
        self.store
            .roles_held(&subject.owner_key(), ContextScope::Exact(context_id))
    }

    /// 역할 경유는 제외
    pub fn has_direct_permission(
        &self,
        subject: &SubjectRef,
        permission: &str,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.resolve_context(context)?;
        let Some(permission) = self.store.permission_by_name(permission)? else {
            return Ok(false);
        };
        self.store.exists(
            GrantKind::Permission,
            &subject.owner_key(),
            permission.id.0,
            ContextScope::Exact(context_id),
        )
    }

    /// 직접 부여된 역할만 본다 (상속 역할 포함은 `roles_for`)
    pub fn has_role(
        &self,
        subject: &SubjectRef,
        role: &str,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        Ok(self.role_names(subject, context)?.iter().any(|r| r == role))
    }

    pub fn has_any_role(
        &self,
        subject: &SubjectRef,
        roles: &[&str],
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let held = self.role_names(subject, context)?;
        Ok(roles.iter().any(|r| held.iter().any(|h| h == r)))
    }

    /// 빈 목록이면 true
    pub fn has_all_roles(
        &self,
        subject: &SubjectRef,
        roles: &[&str],
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let held = self.role_names(subject, context)?;
        Ok(roles.iter().all(|r| held.iter().any(|h| h == r)))
    }

    /// 직접 권한 이름
    pub fn permission_names(
        &self,
        subject: &SubjectRef,
        context: impl Into<ContextInput>,
    ) -> Result<Vec<String>> {
        let context_id = self.resolve_context(context)?;
        self.store.target_names(
            GrantKind::Permission,
            &subject.owner_key(),
            ContextScope::Exact(context_id),
        )
    }

    /// 직접 역할 이름
    pub fn role_names(
        &self,
        subject: &SubjectRef,
        context: impl Into<ContextInput>,
    ) -> Result<Vec<String>> {
        let context_id = self.resolve_context(context)?;
        self.store.target_names(
            GrantKind::Role,
            &subject.owner_key(),
            ContextScope::Exact(context_id),
        )
    }

    // ========================================================================
    // Cache
    // ========================================================================

    pub fn invalidate_subject(&self, subject: &SubjectRef) {
        if let Some(cache) = &self.cache {
            cache.invalidate_subject(subject);
        }
    }

    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    /// 역할 보유자면 전체, subject 면 해당 subject 만 무효화
    pub fn invalidate_holder(&self, holder: &OwnerKey) {
        match holder.subject() {
            Some(subject) => self.invalidate_subject(&subject),
            None => self.invalidate_all(),
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(ResolutionCache::stats)
    }

    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warden_foundation::{NewPermission, NewRole, SqliteStore};

    struct Fixture {
        store: Arc<dyn RbacStore>,
        engine: PermissionEngine,
        user: SubjectRef,
    }

    fn fixture(cache: bool) -> Fixture {
        let store: Arc<dyn RbacStore> =
            Arc::new(SqliteStore::in_memory().expect("Failed to create storage"));
        let cache = cache.then(|| ResolutionCache::new("test", Duration::from_secs(60), 100));
        Fixture {
            engine: PermissionEngine::new(store.clone(), cache),
            store,
            user: SubjectRef::new("user", "1"),
        }
    }

    fn permission(store: &Arc<dyn RbacStore>, name: &str) -> Permission {
        store
            .insert_permission(&NewPermission::new(name))
            .expect("Failed to insert permission")
    }

    #[test]
    fn test_direct_permission() {
        let fx = fixture(false);
        let edit = permission(&fx.store, "posts.edit");
        fx.store
            .attach(GrantKind::Permission, &fx.user.owner_key(), edit.id.0, None)
            .expect("attach");

        assert!(fx.engine.can(&fx.user, "posts.edit", ContextInput::Global).expect("can"));
        assert!(!fx.engine.can(&fx.user, "posts.delete", ContextInput::Global).expect("can"));
        assert!(fx
            .engine
            .has_direct_permission(&fx.user, "posts.edit", ContextInput::Global)
            .expect("has"));
        assert_eq!(
            fx.engine
                .permission_names(&fx.user, ContextInput::Global)
                .expect("names"),
            vec!["posts.edit"]
        );
    }

    #[test]
    fn test_inherited_permission() {
        let fx = fixture(false);
        let publish = permission(&fx.store, "publish");
        let editor = fx.store.insert_role(&NewRole::new("editor")).expect("role");
        let senior = fx.store.insert_role(&NewRole::new("senior-editor")).expect("role");

        fx.store
            .attach(GrantKind::Permission, &editor.owner_key(), publish.id.0, None)
            .expect("attach");
        fx.store
            .attach(GrantKind::Role, &senior.owner_key(), editor.id.0, None)
            .expect("attach");
        fx.store
            .attach(GrantKind::Role, &fx.user.owner_key(), senior.id.0, None)
            .expect("attach");

        assert!(fx.engine.can(&fx.user, "publish", ContextInput::Global).expect("can"));
        assert!(!fx
            .engine
            .has_direct_permission(&fx.user, "publish", ContextInput::Global)
            .expect("has"));

        let roles: Vec<String> = fx
            .engine
            .roles_for(&fx.user, ContextInput::Global)
            .expect("roles")
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(roles, vec!["senior-editor", "editor"]);

        assert!(fx.engine.has_role(&fx.user, "senior-editor", ContextInput::Global).expect("has"));
        assert!(!fx.engine.has_role(&fx.user, "editor", ContextInput::Global).expect("has"));
        assert!(fx
            .engine
            .has_any_role(&fx.user, &["editor", "senior-editor"], ContextInput::Global)
            .expect("has"));
        assert!(!fx
            .engine
            .has_all_roles(&fx.user, &["editor", "senior-editor"], ContextInput::Global)
            .expect("has"));
    }

    #[test]
    fn test_context_exact_match() {
        let fx = fixture(false);
        let edit = permission(&fx.store, "edit");
        let c1 = fx.store.insert_context(Some("c1"), None).expect("context");
        let c2 = fx.store.insert_context(Some("c2"), None).expect("context");

        fx.store
            .attach(GrantKind::Permission, &fx.user.owner_key(), edit.id.0, Some(c1.id))
            .expect("attach");

        assert!(fx.engine.can(&fx.user, "edit", c1.id).expect("can"));
        assert!(!fx.engine.can(&fx.user, "edit", c2.id).expect("can"));
        assert!(!fx.engine.can(&fx.user, "edit", ContextInput::Global).expect("can"));
    }

    #[test]
    fn test_can_any_all() {
        let fx = fixture(false);
        let read = permission(&fx.store, "read");
        permission(&fx.store, "write");
        fx.store
            .attach(GrantKind::Permission, &fx.user.owner_key(), read.id.0, None)
            .expect("attach");

        assert!(fx.engine.can_any(&fx.user, &["write", "read"], ContextInput::Global).expect("any"));
        assert!(!fx.engine.can_all(&fx.user, &["write", "read"], ContextInput::Global).expect("all"));
        assert!(fx.engine.can_all(&fx.user, &[], ContextInput::Global).expect("all"));
        assert!(!fx.engine.can_any(&fx.user, &[], ContextInput::Global).expect("any"));
    }

    #[test]
    fn test_permissions_for_dedup() {
        let fx = fixture(false);
        let read = permission(&fx.store, "read");
        let role = fx.store.insert_role(&NewRole::new("reader")).expect("role");

        let owner = fx.user.owner_key();
        fx.store.attach(GrantKind::Permission, &owner, read.id.0, None).expect("attach");
        fx.store.attach(GrantKind::Permission, &role.owner_key(), read.id.0, None).expect("attach");
        fx.store.attach(GrantKind::Role, &owner, role.id.0, None).expect("attach");

        let permissions = fx.engine.permissions_for(&fx.user, ContextInput::Global).expect("perms");
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0].name, "read");
    }

    #[test]
    fn test_invalid_context_propagates() {
        let fx = fixture(false);
        assert!(fx.engine.can(&fx.user, "x", "not-a-number").is_err());
        assert!(fx.engine.permissions_for(&fx.user, -1i64).is_err());
    }

    #[test]
    fn test_cache_hit_and_invalidation() {
        let fx = fixture(true);
        let read = permission(&fx.store, "read");

        assert!(!fx.engine.can(&fx.user, "read", ContextInput::Global).expect("can"));
        fx.store
            .attach(GrantKind::Permission, &fx.user.owner_key(), read.id.0, None)
            .expect("attach");

        // 무효화 전에는 캐시된 값
        assert!(!fx.engine.can(&fx.user, "read", ContextInput::Global).expect("can"));

        fx.engine.invalidate_holder(&fx.user.owner_key());
        assert!(fx.engine.can(&fx.user, "read", ContextInput::Global).expect("can"));

        let stats = fx.engine.cache_stats().expect("stats");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.invalidations, 1);
    }
}
