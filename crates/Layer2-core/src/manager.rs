//! Warden - 권한 관리 facade
//!
//! 변경 흐름: allow-list → 검증 → context 해석 → GrantStore → 캐시 무효화 → 이벤트
//! 조회 흐름: PermissionEngine
//!
//! 이벤트는 실제로 상태가 바뀐 경우에만 발행한다.
//! listener 실패는 EventBus 가 흡수하므로 변경 결과에 영향을 주지 않는다.
//!
//! 캐시 무효화:
//! - subject 의 권한/역할 변경 → 해당 subject 항목만
//! - 역할 권한, 역할 계층, 엔티티 삭제/이름 변경, context 삭제 → 전체

use crate::authorize::{Authorizer, PolicyAuthorizer};
use crate::context::ContextInput;
use crate::engine::PermissionEngine;
use crate::grant::GrantStore;
use crate::policy::SubjectPolicy;
use crate::validator::{validate_optional_config, validate_permission_name, validate_role_name};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_foundation::{
    AuditEventListener, CacheStats, Context, ContextId, ContextScope, EntityRef, Error,
    EventBus, EventListener, GrantEvent, GrantEventKind, GrantHolder, GrantKind, ListenerId,
    NewPermission, NewRole, OwnerKey, Permission, PermissionId, RbacStore, ResolutionCache,
    Result, Role, RoleId, SqliteStore, SubjectRef, SyncDelta, WardenConfig,
};

// ============================================================================
// References
// ============================================================================

/// 권한 지정 방법 (이름, ID, 엔티티)
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionRef {
    Name(String),
    Id(PermissionId),
    Entity(Permission),
}

impl From<&str> for PermissionRef {
    fn from(name: &str) -> Self {
        PermissionRef::Name(name.to_string())
    }
}

impl From<String> for PermissionRef {
    fn from(name: String) -> Self {
        PermissionRef::Name(name)
    }
}

impl From<&String> for PermissionRef {
    fn from(name: &String) -> Self {
        PermissionRef::Name(name.clone())
    }
}

impl From<PermissionId> for PermissionRef {
    fn from(id: PermissionId) -> Self {
        PermissionRef::Id(id)
    }
}

impl From<Permission> for PermissionRef {
    fn from(permission: Permission) -> Self {
        PermissionRef::Entity(permission)
    }
}

impl From<&Permission> for PermissionRef {
    fn from(permission: &Permission) -> Self {
        PermissionRef::Entity(permission.clone())
    }
}

impl std::fmt::Display for PermissionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionRef::Name(name) => write!(f, "{}", name),
            PermissionRef::Id(id) => write!(f, "{}", id),
            PermissionRef::Entity(permission) => write!(f, "{}", permission.name),
        }
    }
}

/// 역할 지정 방법 (이름은 주어진 context 안에서 찾는다)
#[derive(Debug, Clone, PartialEq)]
pub enum RoleRef {
    Name(String),
    Id(RoleId),
    Entity(Role),
}

impl From<&str> for RoleRef {
    fn from(name: &str) -> Self {
        RoleRef::Name(name.to_string())
    }
}

impl From<String> for RoleRef {
    fn from(name: String) -> Self {
        RoleRef::Name(name)
    }
}

impl From<&String> for RoleRef {
    fn from(name: &String) -> Self {
        RoleRef::Name(name.clone())
    }
}

impl From<RoleId> for RoleRef {
    fn from(id: RoleId) -> Self {
        RoleRef::Id(id)
    }
}

impl From<Role> for RoleRef {
    fn from(role: Role) -> Self {
        RoleRef::Entity(role)
    }
}

impl From<&Role> for RoleRef {
    fn from(role: &Role) -> Self {
        RoleRef::Entity(role.clone())
    }
}

impl std::fmt::Display for RoleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleRef::Name(name) => write!(f, "{}", name),
            RoleRef::Id(id) => write!(f, "{}", id),
            RoleRef::Entity(role) => write!(f, "{}", role.name),
        }
    }
}

// ============================================================================
// Batch outcome
// ============================================================================

/// 배치에서 건너뛴 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub item: String,
    pub reason: String,
}

/// 배치 작업 결과
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    /// 실제로 변경된 항목
    pub applied: Vec<T>,
    /// 이미 원하는 상태였던 항목
    pub unchanged: Vec<T>,
    /// InvalidArgument / Validation 으로 건너뛴 항목
    pub skipped: Vec<SkippedItem>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            applied: Vec::new(),
            unchanged: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }

    fn skip(&mut self, item: impl ToString, error: &Error) {
        let item = item.to_string();
        warn!(item = %item, error = %error, "Skipping batch item");
        self.skipped.push(SkippedItem {
            item,
            reason: error.to_string(),
        });
    }
}

// ============================================================================
// Warden
// ============================================================================

/// 권한 관리 facade
pub struct Warden {
    config: WardenConfig,
    store: Arc<dyn RbacStore>,
    grants: GrantStore,
    engine: Arc<PermissionEngine>,
    events: Arc<EventBus>,
    policy: SubjectPolicy,
    authorizer: Arc<dyn Authorizer>,
}

impl Warden {
    pub fn builder() -> WardenBuilder {
        WardenBuilder::new()
    }

    /// 설정의 storage 경로로 SQLite 를 연다
    pub fn open(config: WardenConfig) -> Result<Self> {
        WardenBuilder::new().config(config).build()
    }

    /// 메모리 SQLite (테스트, 임시 사용)
    pub fn in_memory(config: WardenConfig) -> Result<Self> {
        WardenBuilder::new()
            .config(config)
            .store(Arc::new(SqliteStore::in_memory()?))
            .build()
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RbacStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<PermissionEngine> {
        &self.engine
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn policy(&self) -> &SubjectPolicy {
        &self.policy
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.events.subscribe(listener)
    }

    /// actor 권한을 확인하는 변경 경로
    pub fn acting_as(&self, actor: SubjectRef) -> ActingWarden<'_> {
        ActingWarden {
            warden: self,
            actor,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn emit(&self, actor: Option<&SubjectRef>, kind: GrantEventKind) {
        self.events
            .publish(GrantEvent::new(kind).with_actor(actor.cloned()));
    }

    fn context_id(&self, context: impl Into<ContextInput>) -> Result<Option<ContextId>> {
        self.engine.resolve_context(context)
    }

    fn resolve_permission(&self, permission: &PermissionRef) -> Result<Permission> {
        match permission {
            PermissionRef::Name(name) => self
                .store
                .permission_by_name(name)?
                .ok_or_else(|| Error::InvalidArgument(format!("Permission '{}' not found.", name))),
            PermissionRef::Id(id) => self
                .store
                .permission(*id)?
                .ok_or_else(|| Error::NotFound(format!("{}", id))),
            PermissionRef::Entity(permission) => Ok(permission.clone()),
        }
    }

    /// 알 수 없는 권한이면 None
    fn lookup_permission(&self, permission: &PermissionRef) -> Result<Option<Permission>> {
        match self.resolve_permission(permission) {
            Ok(permission) => Ok(Some(permission)),
            Err(Error::InvalidArgument(_)) | Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 역할을 찾고 context 가 일치하는지 확인
    fn resolve_role(&self, role: &RoleRef, context_id: Option<ContextId>) -> Result<Role> {
        let resolved = match role {
            RoleRef::Name(name) => self.store.role_by_name(name, context_id)?.ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Role '{}' not found in {}.",
                    name,
                    describe_context(context_id)
                ))
            })?,
            RoleRef::Id(id) => self
                .store
                .role(*id)?
                .ok_or_else(|| Error::NotFound(format!("{}", id)))?,
            RoleRef::Entity(role) => role.clone(),
        };

        if resolved.context_id != context_id {
            return Err(Error::InvalidArgument(format!(
                "Role '{}' belongs to {}, not {}.",
                resolved.name,
                describe_context(resolved.context_id),
                describe_context(context_id)
            )));
        }
        Ok(resolved)
    }

    fn lookup_role(&self, role: &RoleRef, context_id: Option<ContextId>) -> Result<Option<Role>> {
        match self.resolve_role(role, context_id) {
            Ok(role) => Ok(Some(role)),
            Err(Error::InvalidArgument(_)) | Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Permissions (entity)
    // ========================================================================

    pub fn create_permission(&self, new: NewPermission) -> Result<Permission> {
        self.create_permission_as(None, new)
    }

    fn create_permission_as(&self, actor: Option<&SubjectRef>, new: NewPermission) -> Result<Permission> {
        validate_permission_name(&new.name)?;
        validate_optional_config(new.config.as_ref(), None)?;

        let permission = self.store.insert_permission(&new)?;
        info!(permission = %permission.name, id = permission.id.0, "Permission created");
        self.emit(
            actor,
            GrantEventKind::PermissionCreated {
                permission_id: permission.id,
                name: permission.name.clone(),
            },
        );
        Ok(permission)
    }

    /// 이름으로 찾고 없으면 생성
    pub fn find_or_create_permission(&self, name: &str) -> Result<Permission> {
        if let Some(permission) = self.store.permission_by_name(name)? {
            return Ok(permission);
        }
        match self.create_permission(NewPermission::new(name)) {
            Err(Error::AlreadyExists(_)) => self
                .store
                .permission_by_name(name)?
                .ok_or_else(|| Error::Internal(format!("Permission '{}' vanished after insert race", name))),
            other => other,
        }
    }

    pub fn find_permission(&self, name: &str) -> Result<Option<Permission>> {
        self.store.permission_by_name(name)
    }

    pub fn permissions(&self) -> Result<Vec<Permission>> {
        self.store.permissions()
    }

    pub fn update_permission(&self, permission: &Permission) -> Result<Permission> {
        validate_permission_name(&permission.name)?;
        validate_optional_config(permission.config.as_ref(), None)?;

        let old = self
            .store
            .permission(permission.id)?
            .ok_or_else(|| Error::NotFound(format!("{}", permission.id)))?;
        let updated = self.store.update_permission(permission)?;

        if old.name != updated.name {
            self.engine.invalidate_all();
        }
        if old.name != updated.name || old.config != updated.config || old.order != updated.order {
            self.emit(
                None,
                GrantEventKind::PermissionUpdated {
                    permission_id: updated.id,
                    old_name: old.name,
                    name: updated.name.clone(),
                },
            );
        }
        Ok(updated)
    }

    /// 연결도 함께 삭제, 없는 권한이면 false
    pub fn delete_permission(&self, permission: impl Into<PermissionRef>) -> Result<bool> {
        self.delete_permission_as(None, &permission.into())
    }

    fn delete_permission_as(&self, actor: Option<&SubjectRef>, permission: &PermissionRef) -> Result<bool> {
        let Some(permission) = self.lookup_permission(permission)? else {
            return Ok(false);
        };
        if !self.store.delete_permission(permission.id)? {
            return Ok(false);
        }

        self.engine.invalidate_all();
        info!(permission = %permission.name, "Permission deleted");
        self.emit(
            actor,
            GrantEventKind::PermissionDeleted {
                permission_id: permission.id,
                name: permission.name,
            },
        );
        Ok(true)
    }

    // ========================================================================
    // Roles (entity)
    // ========================================================================

    pub fn create_role(&self, new: NewRole) -> Result<Role> {
        self.create_role_as(None, new)
    }

    fn create_role_as(&self, actor: Option<&SubjectRef>, new: NewRole) -> Result<Role> {
        validate_role_name(&new.name)?;
        validate_optional_config(new.config.as_ref(), None)?;

        if let Some(context_id) = new.context_id {
            if self.store.context(context_id)?.is_none() {
                return Err(Error::NotFound(format!("{}", context_id)));
            }
        }

        let role = self.store.insert_role(&new)?;
        info!(role = %role.name, id = role.id.0, context_id = ?role.context_id, "Role created");
        self.emit(
            actor,
            GrantEventKind::RoleCreated {
                role_id: role.id,
                name: role.name.clone(),
                context_id: role.context_id,
            },
        );
        Ok(role)
    }

    pub fn find_or_create_role(&self, name: &str, context: impl Into<ContextInput>) -> Result<Role> {
        let context_id = self.context_id(context)?;
        if let Some(role) = self.store.role_by_name(name, context_id)? {
            return Ok(role);
        }
        match self.create_role(NewRole::new(name).in_context(context_id)) {
            Err(Error::AlreadyExists(_)) => self
                .store
                .role_by_name(name, context_id)?
                .ok_or_else(|| Error::Internal(format!("Role '{}' vanished after insert race", name))),
            other => other,
        }
    }

    pub fn find_role(&self, name: &str, context: impl Into<ContextInput>) -> Result<Option<Role>> {
        let context_id = self.context_id(context)?;
        self.store.role_by_name(name, context_id)
    }

    /// 해당 context 의 역할 (Global 이면 context 없는 역할)
    pub fn roles(&self, context: impl Into<ContextInput>) -> Result<Vec<Role>> {
        let context_id = self.context_id(context)?;
        self.store.roles(ContextScope::Exact(context_id))
    }

    pub fn all_roles(&self) -> Result<Vec<Role>> {
        self.store.roles(ContextScope::Any)
    }

    /// 이름/config/order 갱신 (context 는 바꿀 수 없다)
    pub fn update_role(&self, role: &Role) -> Result<Role> {
        validate_role_name(&role.name)?;
        validate_optional_config(role.config.as_ref(), None)?;

        let old = self
            .store
            .role(role.id)?
            .ok_or_else(|| Error::NotFound(format!("{}", role.id)))?;
        let updated = self.store.update_role(role)?;

        if old.name != updated.name {
            self.engine.invalidate_all();
        }
        if old.name != updated.name || old.config != updated.config || old.order != updated.order {
            self.emit(
                None,
                GrantEventKind::RoleUpdated {
                    role_id: updated.id,
                    old_name: old.name,
                    name: updated.name.clone(),
                    context_id: updated.context_id,
                },
            );
        }
        Ok(updated)
    }

    pub fn delete_role(&self, role: &Role) -> Result<bool> {
        self.delete_role_as(None, role)
    }

    fn delete_role_as(&self, actor: Option<&SubjectRef>, role: &Role) -> Result<bool> {
        if !self.store.delete_role(role.id)? {
            return Ok(false);
        }

        self.engine.invalidate_all();
        info!(role = %role.name, "Role deleted");
        self.emit(
            actor,
            GrantEventKind::RoleDeleted {
                role_id: role.id,
                name: role.name.clone(),
                context_id: role.context_id,
            },
        );
        Ok(true)
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    /// 소유자가 이미 context 를 가지면 `AlreadyExists`
    pub fn create_context(&self, name: Option<&str>, owner: Option<&EntityRef>) -> Result<Context> {
        self.create_context_as(None, name, owner)
    }

    fn create_context_as(
        &self,
        actor: Option<&SubjectRef>,
        name: Option<&str>,
        owner: Option<&EntityRef>,
    ) -> Result<Context> {
        if let Some(owner) = owner {
            if owner.entity_type.trim().is_empty() || owner.entity_id.trim().is_empty() {
                return Err(Error::InvalidArgument(
                    "Context owner type and id cannot be empty.".to_string(),
                ));
            }
        }

        let context = self.store.insert_context(name, owner)?;
        info!(context_id = context.id.0, owner = ?context.owner, "Context created");
        self.emit(
            actor,
            GrantEventKind::ContextCreated {
                context_id: context.id,
                name: context.name.clone(),
                owner: context.owner.clone(),
            },
        );
        Ok(context)
    }

    /// 소유자의 context 를 찾고 없으면 생성 (소유자당 최대 1개)
    pub fn context_for(&self, owner: &EntityRef) -> Result<Context> {
        if let Some(context) = self.store.context_by_owner(owner)? {
            return Ok(context);
        }

        let name = Context::default_name_for(owner);
        match self.create_context(Some(&name), Some(owner)) {
            Err(Error::AlreadyExists(_)) => self.store.context_by_owner(owner)?.ok_or_else(|| {
                Error::Internal(format!("Context for {} vanished after insert race", owner))
            }),
            other => other,
        }
    }

    pub fn find_context(&self, owner: &EntityRef) -> Result<Option<Context>> {
        self.store.context_by_owner(owner)
    }

    pub fn context(&self, id: ContextId) -> Result<Option<Context>> {
        self.store.context(id)
    }

    pub fn contexts(&self) -> Result<Vec<Context>> {
        self.store.contexts()
    }

    /// context 의 역할과 context 범위 연결을 모두 삭제
    pub fn delete_context(&self, id: ContextId) -> Result<bool> {
        self.delete_context_as(None, id)
    }

    fn delete_context_as(&self, actor: Option<&SubjectRef>, id: ContextId) -> Result<bool> {
        let Some(context) = self.store.context(id)? else {
            return Ok(false);
        };
        if !self.store.delete_context(id)? {
            return Ok(false);
        }

        self.engine.invalidate_all();
        self.emit(
            actor,
            GrantEventKind::ContextDeleted {
                context_id: context.id,
                name: context.name,
                owner: context.owner,
            },
        );
        Ok(true)
    }

    // ========================================================================
    // Subject permissions
    // ========================================================================

    /// 새로 부여했으면 true, 이미 있었으면 false
    pub fn assign_permission(
        &self,
        subject: &SubjectRef,
        permission: impl Into<PermissionRef>,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.context_id(context)?;
        self.assign_permission_as(None, subject, &permission.into(), context_id)
    }

    fn assign_permission_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        permission: &PermissionRef,
        context_id: Option<ContextId>,
    ) -> Result<bool> {
        self.policy.check(subject)?;
        let permission = self.resolve_permission(permission)?;

        let attached = self
            .grants
            .attach(GrantKind::Permission, subject, permission.id.0, context_id)?;
        if attached {
            self.engine.invalidate_subject(subject);
            self.emit(
                actor,
                GrantEventKind::PermissionAssigned {
                    holder: subject.owner_key(),
                    permission_id: permission.id,
                    permission: permission.name,
                    context_id,
                },
            );
        }
        Ok(attached)
    }

    /// 항목별 InvalidArgument / Validation 은 건너뛰고 계속
    pub fn assign_permissions<I, P>(
        &self,
        subject: &SubjectRef,
        permissions: I,
        context: impl Into<ContextInput>,
    ) -> Result<BatchOutcome<Permission>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionRef>,
    {
        let context_id = self.context_id(context)?;
        let permissions: Vec<PermissionRef> = permissions.into_iter().map(Into::into).collect();
        self.assign_permissions_as(None, subject, &permissions, context_id)
    }

    fn assign_permissions_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        permissions: &[PermissionRef],
        context_id: Option<ContextId>,
    ) -> Result<BatchOutcome<Permission>> {
        self.policy.check(subject)?;

        let mut outcome = BatchOutcome::default();
        let result = permissions.iter().try_for_each(|item| {
            let permission = match self.resolve_permission(item) {
                Ok(permission) => permission,
                Err(e) if e.is_batch_skippable() => {
                    outcome.skip(item, &e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            if self
                .grants
                .attach(GrantKind::Permission, subject, permission.id.0, context_id)?
            {
                outcome.applied.push(permission);
            } else {
                outcome.unchanged.push(permission);
            }
            Ok(())
        });

        if outcome.changed() {
            self.engine.invalidate_subject(subject);
            self.emit(
                actor,
                GrantEventKind::PermissionsAssignedBatch {
                    holder: subject.owner_key(),
                    permission_ids: outcome.applied.iter().map(|p| p.id).collect(),
                    context_id,
                },
            );
        }
        result.map(|_| outcome)
    }

    /// 알 수 없는 권한이나 없는 연결이면 false
    pub fn revoke_permission(
        &self,
        subject: &SubjectRef,
        permission: impl Into<PermissionRef>,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.context_id(context)?;
        self.revoke_permission_as(None, subject, &permission.into(), context_id)
    }

    fn revoke_permission_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        permission: &PermissionRef,
        context_id: Option<ContextId>,
    ) -> Result<bool> {
        let Some(permission) = self.lookup_permission(permission)? else {
            return Ok(false);
        };

        let removed = self.grants.detach(
            GrantKind::Permission,
            subject,
            Some(permission.id.0),
            ContextScope::Exact(context_id),
        )?;
        if removed == 0 {
            return Ok(false);
        }

        self.engine.invalidate_subject(subject);
        self.emit(
            actor,
            GrantEventKind::PermissionRemoved {
                holder: subject.owner_key(),
                permission_id: permission.id,
                permission: permission.name,
                context_id,
            },
        );
        Ok(true)
    }

    pub fn revoke_permissions<I, P>(
        &self,
        subject: &SubjectRef,
        permissions: I,
        context: impl Into<ContextInput>,
    ) -> Result<BatchOutcome<Permission>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionRef>,
    {
        let context_id = self.context_id(context)?;
        let permissions: Vec<PermissionRef> = permissions.into_iter().map(Into::into).collect();
        self.revoke_permissions_as(None, subject, &permissions, context_id)
    }

    fn revoke_permissions_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        permissions: &[PermissionRef],
        context_id: Option<ContextId>,
    ) -> Result<BatchOutcome<Permission>> {
        let mut outcome = BatchOutcome::default();
        let result = permissions.iter().try_for_each(|item| {
            let permission = match self.resolve_permission(item) {
                Ok(permission) => permission,
                Err(e) if e.is_batch_skippable() => {
                    outcome.skip(item, &e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let removed = self.grants.detach(
                GrantKind::Permission,
                subject,
                Some(permission.id.0),
                ContextScope::Exact(context_id),
            )?;
            if removed > 0 {
                outcome.applied.push(permission);
            } else {
                outcome.unchanged.push(permission);
            }
            Ok(())
        });

        if outcome.changed() {
            self.engine.invalidate_subject(subject);
            self.emit(
                actor,
                GrantEventKind::PermissionsRemovedBatch {
                    holder: subject.owner_key(),
                    permission_ids: outcome.applied.iter().map(|p| p.id).collect(),
                    context_id,
                },
            );
        }
        result.map(|_| outcome)
    }

    /// 해당 context 범위의 직접 권한 전부 회수, 회수된 ID 반환
    pub fn revoke_all_permissions(
        &self,
        subject: &SubjectRef,
        context: impl Into<ContextInput>,
    ) -> Result<Vec<PermissionId>> {
        let context_id = self.context_id(context)?;
        self.revoke_all_permissions_as(None, subject, context_id)
    }

    fn revoke_all_permissions_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        context_id: Option<ContextId>,
    ) -> Result<Vec<PermissionId>> {
        let delta = self
            .grants
            .sync(GrantKind::Permission, subject, &[], context_id)?;
        let removed: Vec<PermissionId> = delta.detached.into_iter().map(PermissionId).collect();

        if !removed.is_empty() {
            self.engine.invalidate_subject(subject);
            self.emit(
                actor,
                GrantEventKind::PermissionsRemovedBatch {
                    holder: subject.owner_key(),
                    permission_ids: removed.clone(),
                    context_id,
                },
            );
        }
        Ok(removed)
    }

    /// 해당 context 범위의 직접 권한을 정확히 `permissions` 로 맞춘다
    ///
    /// 알 수 없는 권한이 하나라도 있으면 아무것도 바꾸지 않고 `InvalidArgument`.
    pub fn sync_permissions<I, P>(
        &self,
        subject: &SubjectRef,
        permissions: I,
        context: impl Into<ContextInput>,
    ) -> Result<SyncDelta<PermissionId>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionRef>,
    {
        let context_id = self.context_id(context)?;
        let permissions: Vec<PermissionRef> = permissions.into_iter().map(Into::into).collect();
        self.sync_permissions_as(None, subject, &permissions, context_id)
    }

    fn sync_permissions_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        permissions: &[PermissionRef],
        context_id: Option<ContextId>,
    ) -> Result<SyncDelta<PermissionId>> {
        self.policy.check(subject)?;
        let ids = permissions
            .iter()
            .map(|p| self.resolve_permission(p).map(|p| p.id.0))
            .collect::<Result<Vec<_>>>()?;

        let delta = self
            .grants
            .sync(GrantKind::Permission, subject, &ids, context_id)?
            .map(PermissionId);

        if !delta.is_empty() {
            self.engine.invalidate_subject(subject);
            self.emit(
                actor,
                GrantEventKind::PermissionsSynced {
                    holder: subject.owner_key(),
                    attached: delta.attached.clone(),
                    detached: delta.detached.clone(),
                    context_id,
                },
            );
        }
        Ok(delta)
    }

    // ========================================================================
    // Subject roles
    // ========================================================================

    /// 역할의 context 는 주어진 context 와 같아야 한다
    pub fn assign_role(
        &self,
        subject: &SubjectRef,
        role: impl Into<RoleRef>,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.context_id(context)?;
        self.assign_role_as(None, subject, &role.into(), context_id)
    }

    fn assign_role_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        role: &RoleRef,
        context_id: Option<ContextId>,
    ) -> Result<bool> {
        self.policy.check(subject)?;
        let role = self.resolve_role(role, context_id)?;

        let attached = self
            .grants
            .attach(GrantKind::Role, subject, role.id.0, context_id)?;
        if attached {
            self.engine.invalidate_subject(subject);
            self.emit(
                actor,
                GrantEventKind::RoleAssigned {
                    holder: subject.owner_key(),
                    role_id: role.id,
                    role: role.name,
                    context_id,
                },
            );
        }
        Ok(attached)
    }

    pub fn assign_roles<I, R>(
        &self,
        subject: &SubjectRef,
        roles: I,
        context: impl Into<ContextInput>,
    ) -> Result<BatchOutcome<Role>>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        let context_id = self.context_id(context)?;
        let roles: Vec<RoleRef> = roles.into_iter().map(Into::into).collect();
        self.assign_roles_as(None, subject, &roles, context_id)
    }

    fn assign_roles_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        roles: &[RoleRef],
        context_id: Option<ContextId>,
    ) -> Result<BatchOutcome<Role>> {
        self.policy.check(subject)?;

        let mut outcome = BatchOutcome::default();
        let result = roles.iter().try_for_each(|item| {
            let role = match self.resolve_role(item, context_id) {
                Ok(role) => role,
                Err(e) if e.is_batch_skippable() => {
                    outcome.skip(item, &e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            if self
                .grants
                .attach(GrantKind::Role, subject, role.id.0, context_id)?
            {
                outcome.applied.push(role);
            } else {
                outcome.unchanged.push(role);
            }
            Ok(())
        });

        if outcome.changed() {
            self.engine.invalidate_subject(subject);
            self.emit(
                actor,
                GrantEventKind::RolesAssignedBatch {
                    holder: subject.owner_key(),
                    role_ids: outcome.applied.iter().map(|r| r.id).collect(),
                    context_id,
                },
            );
        }
        result.map(|_| outcome)
    }

    /// 알 수 없는 역할이나 없는 연결이면 false
    pub fn remove_role(
        &self,
        subject: &SubjectRef,
        role: impl Into<RoleRef>,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.context_id(context)?;
        self.remove_role_as(None, subject, &role.into(), context_id)
    }

    fn remove_role_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        role: &RoleRef,
        context_id: Option<ContextId>,
    ) -> Result<bool> {
        let Some(role) = self.lookup_role(role, context_id)? else {
            return Ok(false);
        };

        let removed = self.grants.detach(
            GrantKind::Role,
            subject,
            Some(role.id.0),
            ContextScope::Exact(context_id),
        )?;
        if removed == 0 {
            return Ok(false);
        }

        self.engine.invalidate_subject(subject);
        self.emit(
            actor,
            GrantEventKind::RoleRemoved {
                holder: subject.owner_key(),
                role_id: role.id,
                role: role.name,
                context_id,
            },
        );
        Ok(true)
    }

    pub fn remove_roles<I, R>(
        &self,
        subject: &SubjectRef,
        roles: I,
        context: impl Into<ContextInput>,
    ) -> Result<BatchOutcome<Role>>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        let context_id = self.context_id(context)?;
        let roles: Vec<RoleRef> = roles.into_iter().map(Into::into).collect();
        self.remove_roles_as(None, subject, &roles, context_id)
    }

    fn remove_roles_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        roles: &[RoleRef],
        context_id: Option<ContextId>,
    ) -> Result<BatchOutcome<Role>> {
        let mut outcome = BatchOutcome::default();
        let result = roles.iter().try_for_each(|item| {
            let role = match self.resolve_role(item, context_id) {
                Ok(role) => role,
                Err(e) if e.is_batch_skippable() => {
                    outcome.skip(item, &e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let removed = self.grants.detach(
                GrantKind::Role,
                subject,
                Some(role.id.0),
                ContextScope::Exact(context_id),
            )?;
            if removed > 0 {
                outcome.applied.push(role);
            } else {
                outcome.unchanged.push(role);
            }
            Ok(())
        });

        if outcome.changed() {
            self.engine.invalidate_subject(subject);
            self.emit(
                actor,
                GrantEventKind::RolesRemovedBatch {
                    holder: subject.owner_key(),
                    role_ids: outcome.applied.iter().map(|r| r.id).collect(),
                    context_id,
                },
            );
        }
        result.map(|_| outcome)
    }

    /// 해당 context 의 직접 역할을 정확히 `roles` 로 맞춘다
    pub fn sync_roles<I, R>(
        &self,
        subject: &SubjectRef,
        roles: I,
        context: impl Into<ContextInput>,
    ) -> Result<SyncDelta<RoleId>>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        let context_id = self.context_id(context)?;
        let roles: Vec<RoleRef> = roles.into_iter().map(Into::into).collect();
        self.sync_roles_as(None, subject, &roles, context_id)
    }

    fn sync_roles_as(
        &self,
        actor: Option<&SubjectRef>,
        subject: &SubjectRef,
        roles: &[RoleRef],
        context_id: Option<ContextId>,
    ) -> Result<SyncDelta<RoleId>> {
        self.policy.check(subject)?;
        let ids = roles
            .iter()
            .map(|r| self.resolve_role(r, context_id).map(|r| r.id.0))
            .collect::<Result<Vec<_>>>()?;

        let delta = self
            .grants
            .sync(GrantKind::Role, subject, &ids, context_id)?
            .map(RoleId);

        if !delta.is_empty() {
            self.engine.invalidate_subject(subject);
            self.emit(
                actor,
                GrantEventKind::RolesSynced {
                    holder: subject.owner_key(),
                    attached: delta.attached.clone(),
                    detached: delta.detached.clone(),
                    context_id,
                },
            );
        }
        Ok(delta)
    }

    // ========================================================================
    // Role permissions
    // ========================================================================

    /// 역할 권한은 역할 자신의 context 범위로 저장된다
    pub fn give_role_permission(&self, role: &Role, permission: impl Into<PermissionRef>) -> Result<bool> {
        self.give_role_permission_as(None, role, &permission.into())
    }

    fn give_role_permission_as(
        &self,
        actor: Option<&SubjectRef>,
        role: &Role,
        permission: &PermissionRef,
    ) -> Result<bool> {
        let permission = self.resolve_permission(permission)?;
        let attached = self
            .grants
            .attach(GrantKind::Permission, role, permission.id.0, role.context_id)?;
        if attached {
            self.engine.invalidate_all();
            self.emit(
                actor,
                GrantEventKind::PermissionAssigned {
                    holder: role.owner_key(),
                    permission_id: permission.id,
                    permission: permission.name,
                    context_id: role.context_id,
                },
            );
        }
        Ok(attached)
    }

    pub fn revoke_role_permission(&self, role: &Role, permission: impl Into<PermissionRef>) -> Result<bool> {
        self.revoke_role_permission_as(None, role, &permission.into())
    }

    fn revoke_role_permission_as(
        &self,
        actor: Option<&SubjectRef>,
        role: &Role,
        permission: &PermissionRef,
    ) -> Result<bool> {
        let Some(permission) = self.lookup_permission(permission)? else {
            return Ok(false);
        };
        let removed = self.grants.detach(
            GrantKind::Permission,
            role,
            Some(permission.id.0),
            ContextScope::Exact(role.context_id),
        )?;
        if removed == 0 {
            return Ok(false);
        }

        self.engine.invalidate_all();
        self.emit(
            actor,
            GrantEventKind::PermissionRemoved {
                holder: role.owner_key(),
                permission_id: permission.id,
                permission: permission.name,
                context_id: role.context_id,
            },
        );
        Ok(true)
    }

    pub fn sync_role_permissions<I, P>(&self, role: &Role, permissions: I) -> Result<SyncDelta<PermissionId>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionRef>,
    {
        let permissions: Vec<PermissionRef> = permissions.into_iter().map(Into::into).collect();
        self.sync_role_permissions_as(None, role, &permissions)
    }

    fn sync_role_permissions_as(
        &self,
        actor: Option<&SubjectRef>,
        role: &Role,
        permissions: &[PermissionRef],
    ) -> Result<SyncDelta<PermissionId>> {
        let ids = permissions
            .iter()
            .map(|p| self.resolve_permission(p).map(|p| p.id.0))
            .collect::<Result<Vec<_>>>()?;

        let delta = self
            .grants
            .sync(GrantKind::Permission, role, &ids, role.context_id)?
            .map(PermissionId);

        if !delta.is_empty() {
            self.engine.invalidate_all();
            self.emit(
                actor,
                GrantEventKind::PermissionsSynced {
                    holder: role.owner_key(),
                    attached: delta.attached.clone(),
                    detached: delta.detached.clone(),
                    context_id: role.context_id,
                },
            );
        }
        Ok(delta)
    }

    pub fn role_permissions(&self, role: &Role) -> Result<Vec<Permission>> {
        self.store
            .permissions_held(&[role.owner_key()], ContextScope::Exact(role.context_id))
    }

    // ========================================================================
    // Role hierarchy
    // ========================================================================

    /// parent 가 child 의 권한을 상속 (이름은 parent 의 context 에서 찾는다)
    pub fn assign_child_role(&self, parent: &Role, child: impl Into<RoleRef>) -> Result<bool> {
        self.assign_child_role_as(None, parent, &child.into())
    }

    fn assign_child_role_as(
        &self,
        actor: Option<&SubjectRef>,
        parent: &Role,
        child: &RoleRef,
    ) -> Result<bool> {
        let child = self.resolve_child(parent, child)?;
        let attached = self.grants.assign_child_role(parent, &child)?;
        if attached {
            self.engine.invalidate_all();
            self.emit(
                actor,
                GrantEventKind::RoleChildAssigned {
                    parent_id: parent.id,
                    parent: parent.name.clone(),
                    child_id: child.id,
                    child: child.name,
                },
            );
        }
        Ok(attached)
    }

    pub fn remove_child_role(&self, parent: &Role, child: impl Into<RoleRef>) -> Result<bool> {
        self.remove_child_role_as(None, parent, &child.into())
    }

    fn remove_child_role_as(
        &self,
        actor: Option<&SubjectRef>,
        parent: &Role,
        child: &RoleRef,
    ) -> Result<bool> {
        let child = match self.resolve_child(parent, child) {
            Ok(child) => child,
            Err(Error::InvalidArgument(_)) | Err(Error::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if !self.grants.remove_child_role(parent, &child)? {
            return Ok(false);
        }

        self.engine.invalidate_all();
        self.emit(
            actor,
            GrantEventKind::RoleChildRemoved {
                parent_id: parent.id,
                parent: parent.name.clone(),
                child_id: child.id,
                child: child.name,
            },
        );
        Ok(true)
    }

    /// 이름은 parent 의 context 에서, ID/엔티티는 context 제약 없이
    fn resolve_child(&self, parent: &Role, child: &RoleRef) -> Result<Role> {
        match child {
            RoleRef::Name(_) => self.resolve_role(child, parent.context_id),
            RoleRef::Id(id) => self
                .store
                .role(*id)?
                .ok_or_else(|| Error::NotFound(format!("{}", id))),
            RoleRef::Entity(role) => Ok(role.clone()),
        }
    }

    pub fn child_roles(&self, role: &Role) -> Result<Vec<Role>> {
        self.grants.child_roles(role)
    }

    pub fn parent_roles(&self, role: &Role) -> Result<Vec<Role>> {
        self.grants.parent_roles(role)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn can(
        &self,
        subject: &SubjectRef,
        permission: &str,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        self.engine.can(subject, permission, context)
    }

    pub fn can_any(
        &self,
        subject: &SubjectRef,
        permissions: &[&str],
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        self.engine.can_any(subject, permissions, context)
    }

    pub fn can_all(
        &self,
        subject: &SubjectRef,
        permissions: &[&str],
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        self.engine.can_all(subject, permissions, context)
    }

    pub fn permissions_for(
        &self,
        subject: &SubjectRef,
        context: impl Into<ContextInput>,
    ) -> Result<Vec<Permission>> {
        self.engine.permissions_for(subject, context)
    }

    pub fn roles_for(&self, subject: &SubjectRef, context: impl Into<ContextInput>) -> Result<Vec<Role>> {
        self.engine.roles_for(subject, context)
    }

    pub fn has_role(
        &self,
        subject: &SubjectRef,
        role: &str,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        self.engine.has_role(subject, role, context)
    }

    pub fn permission_names(
        &self,
        subject: &SubjectRef,
        context: impl Into<ContextInput>,
    ) -> Result<Vec<String>> {
        self.engine.permission_names(subject, context)
    }

    pub fn role_names(&self, subject: &SubjectRef, context: impl Into<ContextInput>) -> Result<Vec<String>> {
        self.engine.role_names(subject, context)
    }

    /// 권한을 (어떤 context 로든) 직접 가진 subject
    pub fn subjects_with_permission(&self, permission: impl Into<PermissionRef>) -> Result<Vec<SubjectRef>> {
        let Some(permission) = self.lookup_permission(&permission.into())? else {
            return Ok(Vec::new());
        };
        Ok(self
            .store
            .holders_of_permission(permission.id)?
            .iter()
            .filter_map(OwnerKey::subject)
            .collect())
    }

    /// 역할을 직접 가진 subject (부모 역할 제외)
    pub fn subjects_with_role(&self, role: &Role) -> Result<Vec<SubjectRef>> {
        Ok(self
            .store
            .holders_of_role(role.id)?
            .iter()
            .filter_map(OwnerKey::subject)
            .collect())
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.engine.cache_stats()
    }

    pub fn flush_cache(&self) {
        self.engine.invalidate_all();
    }
}

fn describe_context(context_id: Option<ContextId>) -> String {
    match context_id {
        Some(id) => format!("{}", id),
        None => "the global scope".to_string(),
    }
}

// ============================================================================
// Acting Warden
// ============================================================================

/// actor 의 관리 권한을 확인한 뒤 변경하고, 이벤트에 actor 를 남긴다
pub struct ActingWarden<'a> {
    warden: &'a Warden,
    actor: SubjectRef,
}

impl<'a> ActingWarden<'a> {
    pub fn actor(&self) -> &SubjectRef {
        &self.actor
    }

    fn require(&self, allowed: bool, action: &str) -> Result<()> {
        if allowed {
            return Ok(());
        }
        debug!(actor = %self.actor, action, "Authorization denied");
        Err(Error::AuthorizationDenied(format!(
            "{} is not allowed to {}",
            self.actor, action
        )))
    }

    fn require_manage(&self, action: &str) -> Result<()> {
        self.require(self.warden.authorizer.can_manage(&self.actor)?, action)
    }

    /// 해석 가능한 권한은 이름으로, 나머지는 이름 없이 확인
    fn require_assign_permissions(&self, target: &OwnerKey, permissions: &[PermissionRef]) -> Result<()> {
        let authorizer = &self.warden.authorizer;
        if permissions.is_empty() {
            return self.require(
                authorizer.can_assign_permission(&self.actor, target, None)?,
                "assign permissions",
            );
        }
        for permission in permissions {
            let name = self.warden.lookup_permission(permission)?.map(|p| p.name);
            self.require(
                authorizer.can_assign_permission(&self.actor, target, name.as_deref())?,
                &format!("assign permission '{}'", permission),
            )?;
        }
        Ok(())
    }

    fn require_assign_roles(
        &self,
        target: &OwnerKey,
        roles: &[RoleRef],
        context_id: Option<ContextId>,
    ) -> Result<()> {
        let authorizer = &self.warden.authorizer;
        if roles.is_empty() {
            return self.require(
                authorizer.can_assign_role(&self.actor, target, None)?,
                "assign roles",
            );
        }
        for role in roles {
            let name = self.warden.lookup_role(role, context_id)?.map(|r| r.name);
            self.require(
                authorizer.can_assign_role(&self.actor, target, name.as_deref())?,
                &format!("assign role '{}'", role),
            )?;
        }
        Ok(())
    }

    fn require_revoke_permissions(&self, target: &OwnerKey) -> Result<()> {
        self.require(
            self.warden
                .authorizer
                .can_revoke_permission(&self.actor, target)?,
            "revoke permissions",
        )
    }

    fn require_revoke_roles(&self, target: &OwnerKey) -> Result<()> {
        self.require(
            self.warden.authorizer.can_revoke_role(&self.actor, target)?,
            "revoke roles",
        )
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    pub fn create_permission(&self, new: NewPermission) -> Result<Permission> {
        self.require_manage("create permissions")?;
        self.warden.create_permission_as(Some(&self.actor), new)
    }

    pub fn delete_permission(&self, permission: impl Into<PermissionRef>) -> Result<bool> {
        self.require_manage("delete permissions")?;
        self.warden
            .delete_permission_as(Some(&self.actor), &permission.into())
    }

    pub fn create_role(&self, new: NewRole) -> Result<Role> {
        self.require_manage("create roles")?;
        self.warden.create_role_as(Some(&self.actor), new)
    }

    pub fn delete_role(&self, role: &Role) -> Result<bool> {
        self.require_manage("delete roles")?;
        self.warden.delete_role_as(Some(&self.actor), role)
    }

    pub fn create_context(&self, name: Option<&str>, owner: Option<&EntityRef>) -> Result<Context> {
        self.require_manage("create contexts")?;
        self.warden.create_context_as(Some(&self.actor), name, owner)
    }

    pub fn delete_context(&self, id: ContextId) -> Result<bool> {
        self.require_manage("delete contexts")?;
        self.warden.delete_context_as(Some(&self.actor), id)
    }

    // ------------------------------------------------------------------------
    // Subject grants
    // ------------------------------------------------------------------------

    pub fn assign_permission(
        &self,
        subject: &SubjectRef,
        permission: impl Into<PermissionRef>,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.warden.context_id(context)?;
        let permission = permission.into();
        self.require_assign_permissions(&subject.owner_key(), std::slice::from_ref(&permission))?;
        self.warden
            .assign_permission_as(Some(&self.actor), subject, &permission, context_id)
    }

    pub fn assign_permissions<I, P>(
        &self,
        subject: &SubjectRef,
        permissions: I,
        context: impl Into<ContextInput>,
    ) -> Result<BatchOutcome<Permission>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionRef>,
    {
        let context_id = self.warden.context_id(context)?;
        let permissions: Vec<PermissionRef> = permissions.into_iter().map(Into::into).collect();
        self.require_assign_permissions(&subject.owner_key(), &permissions)?;
        self.warden
            .assign_permissions_as(Some(&self.actor), subject, &permissions, context_id)
    }

    pub fn revoke_permission(
        &self,
        subject: &SubjectRef,
        permission: impl Into<PermissionRef>,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.warden.context_id(context)?;
        self.require_revoke_permissions(&subject.owner_key())?;
        self.warden
            .revoke_permission_as(Some(&self.actor), subject, &permission.into(), context_id)
    }

    pub fn revoke_permissions<I, P>(
        &self,
        subject: &SubjectRef,
        permissions: I,
        context: impl Into<ContextInput>,
    ) -> Result<BatchOutcome<Permission>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionRef>,
    {
        let context_id = self.warden.context_id(context)?;
        let permissions: Vec<PermissionRef> = permissions.into_iter().map(Into::into).collect();
        self.require_revoke_permissions(&subject.owner_key())?;
        self.warden
            .revoke_permissions_as(Some(&self.actor), subject, &permissions, context_id)
    }

    pub fn revoke_all_permissions(
        &self,
        subject: &SubjectRef,
        context: impl Into<ContextInput>,
    ) -> Result<Vec<PermissionId>> {
        let context_id = self.warden.context_id(context)?;
        self.require_revoke_permissions(&subject.owner_key())?;
        self.warden
            .revoke_all_permissions_as(Some(&self.actor), subject, context_id)
    }

    pub fn sync_permissions<I, P>(
        &self,
        subject: &SubjectRef,
        permissions: I,
        context: impl Into<ContextInput>,
    ) -> Result<SyncDelta<PermissionId>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionRef>,
    {
        let context_id = self.warden.context_id(context)?;
        let permissions: Vec<PermissionRef> = permissions.into_iter().map(Into::into).collect();
        let target = subject.owner_key();
        self.require_assign_permissions(&target, &permissions)?;
        self.require_revoke_permissions(&target)?;
        self.warden
            .sync_permissions_as(Some(&self.actor), subject, &permissions, context_id)
    }

    pub fn assign_role(
        &self,
        subject: &SubjectRef,
        role: impl Into<RoleRef>,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.warden.context_id(context)?;
        let role = role.into();
        self.require_assign_roles(&subject.owner_key(), std::slice::from_ref(&role), context_id)?;
        self.warden
            .assign_role_as(Some(&self.actor), subject, &role, context_id)
    }

    pub fn assign_roles<I, R>(
        &self,
        subject: &SubjectRef,
        roles: I,
        context: impl Into<ContextInput>,
    ) -> Result<BatchOutcome<Role>>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        let context_id = self.warden.context_id(context)?;
        let roles: Vec<RoleRef> = roles.into_iter().map(Into::into).collect();
        self.require_assign_roles(&subject.owner_key(), &roles, context_id)?;
        self.warden
            .assign_roles_as(Some(&self.actor), subject, &roles, context_id)
    }

    pub fn remove_role(
        &self,
        subject: &SubjectRef,
        role: impl Into<RoleRef>,
        context: impl Into<ContextInput>,
    ) -> Result<bool> {
        let context_id = self.warden.context_id(context)?;
        self.require_revoke_roles(&subject.owner_key())?;
        self.warden
            .remove_role_as(Some(&self.actor), subject, &role.into(), context_id)
    }

    pub fn remove_roles<I, R>(
        &self,
        subject: &SubjectRef,
        roles: I,
        context: impl Into<ContextInput>,
    ) -> Result<BatchOutcome<Role>>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        let context_id = self.warden.context_id(context)?;
        let roles: Vec<RoleRef> = roles.into_iter().map(Into::into).collect();
        self.require_revoke_roles(&subject.owner_key())?;
        self.warden
            .remove_roles_as(Some(&self.actor), subject, &roles, context_id)
    }

    pub fn sync_roles<I, R>(
        &self,
        subject: &SubjectRef,
        roles: I,
        context: impl Into<ContextInput>,
    ) -> Result<SyncDelta<RoleId>>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        let context_id = self.warden.context_id(context)?;
        let roles: Vec<RoleRef> = roles.into_iter().map(Into::into).collect();
        let target = subject.owner_key();
        self.require_assign_roles(&target, &roles, context_id)?;
        self.require_revoke_roles(&target)?;
        self.warden
            .sync_roles_as(Some(&self.actor), subject, &roles, context_id)
    }

    // ------------------------------------------------------------------------
    // Role grants
    // ------------------------------------------------------------------------

    pub fn give_role_permission(&self, role: &Role, permission: impl Into<PermissionRef>) -> Result<bool> {
        let permission = permission.into();
        self.require_assign_permissions(&role.owner_key(), std::slice::from_ref(&permission))?;
        self.warden
            .give_role_permission_as(Some(&self.actor), role, &permission)
    }

    pub fn revoke_role_permission(&self, role: &Role, permission: impl Into<PermissionRef>) -> Result<bool> {
        self.require_revoke_permissions(&role.owner_key())?;
        self.warden
            .revoke_role_permission_as(Some(&self.actor), role, &permission.into())
    }

    pub fn sync_role_permissions<I, P>(&self, role: &Role, permissions: I) -> Result<SyncDelta<PermissionId>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionRef>,
    {
        let permissions: Vec<PermissionRef> = permissions.into_iter().map(Into::into).collect();
        let target = role.owner_key();
        self.require_assign_permissions(&target, &permissions)?;
        self.require_revoke_permissions(&target)?;
        self.warden
            .sync_role_permissions_as(Some(&self.actor), role, &permissions)
    }

    pub fn assign_child_role(&self, parent: &Role, child: impl Into<RoleRef>) -> Result<bool> {
        let child = child.into();
        self.require_assign_roles(&parent.owner_key(), std::slice::from_ref(&child), parent.context_id)?;
        self.warden
            .assign_child_role_as(Some(&self.actor), parent, &child)
    }

    pub fn remove_child_role(&self, parent: &Role, child: impl Into<RoleRef>) -> Result<bool> {
        self.require_revoke_roles(&parent.owner_key())?;
        self.warden
            .remove_child_role_as(Some(&self.actor), parent, &child.into())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Warden 빌더
pub struct WardenBuilder {
    config: WardenConfig,
    store: Option<Arc<dyn RbacStore>>,
    events: Option<Arc<EventBus>>,
    policy: Option<SubjectPolicy>,
    authorizer: Option<Arc<dyn Authorizer>>,
    audit: Option<AuditEventListener>,
}

impl WardenBuilder {
    pub fn new() -> Self {
        Self {
            config: WardenConfig::default(),
            store: None,
            events: None,
            policy: None,
            authorizer: None,
            audit: None,
        }
    }

    /// 설정
    pub fn config(mut self, config: WardenConfig) -> Self {
        self.config = config;
        self
    }

    /// 저장소 (기본: 설정의 storage 경로에 SQLite)
    pub fn store(mut self, store: Arc<dyn RbacStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 이벤트 버스 공유
    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// subject allow-list (기본: 설정의 subjects.allowedTypes)
    pub fn subject_policy(mut self, policy: SubjectPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// authorizer (기본: PolicyAuthorizer)
    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// 감사 listener 직접 지정 (기본: 설정의 audit 섹션)
    pub fn audit_listener(mut self, listener: AuditEventListener) -> Self {
        self.audit = Some(listener);
        self
    }

    /// 빌드
    pub fn build(self) -> Result<Warden> {
        let config = self.config;

        let store: Arc<dyn RbacStore> = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteStore::from_settings(&config.storage)?),
        };

        let cache = ResolutionCache::from_settings(&config.cache);
        let engine = Arc::new(PermissionEngine::new(store.clone(), cache));

        let events = self.events.unwrap_or_else(|| Arc::new(EventBus::new()));
        let audit = match self.audit {
            Some(listener) => Some(listener),
            None => AuditEventListener::from_settings(&config.audit, &config.storage)?,
        };
        if let Some(listener) = audit {
            Arc::new(listener).register(&events);
        }

        let policy = self
            .policy
            .unwrap_or_else(|| SubjectPolicy::from_settings(&config.subjects));
        let authorizer = self.authorizer.unwrap_or_else(|| {
            Arc::new(PolicyAuthorizer::new(
                config.authorization.clone(),
                engine.clone(),
            ))
        });

        debug!(
            caching = engine.is_caching(),
            listeners = events.listener_count(),
            "Warden initialized"
        );

        Ok(Warden {
            grants: GrantStore::new(store.clone()),
            config,
            store,
            engine,
            events,
            policy,
            authorizer,
        })
    }
}

impl Default for WardenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorize::AllowAll;
    use warden_foundation::CacheSettings;

    fn warden() -> Warden {
        Warden::in_memory(WardenConfig::default().with_cache(CacheSettings::disabled()))
            .expect("Failed to create warden")
    }

    fn user(id: &str) -> SubjectRef {
        SubjectRef::new("user", id)
    }

    #[test]
    fn test_create_validates_name() {
        let warden = warden();
        let err = warden.create_permission(NewPermission::new("Posts")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(warden.create_permission(NewPermission::new("posts.create")).is_ok());
        assert!(matches!(
            warden.create_permission(NewPermission::new("posts.create")),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_find_or_create() {
        let warden = warden();
        let first = warden.find_or_create_permission("read").expect("create");
        let second = warden.find_or_create_permission("read").expect("find");
        assert_eq!(first.id, second.id);

        let global = warden.find_or_create_role("editor", ContextInput::Global).expect("role");
        let context = warden.create_context(Some("team"), None).expect("context");
        let scoped = warden.find_or_create_role("editor", context.id).expect("role");
        assert_ne!(global.id, scoped.id);
        assert_eq!(scoped.context_id, Some(context.id));
    }

    #[test]
    fn test_assign_unknown_permission_is_invalid() {
        let warden = warden();
        let err = warden
            .assign_permission(&user("1"), "missing", ContextInput::Global)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!warden
            .revoke_permission(&user("1"), "missing", ContextInput::Global)
            .expect("revoke"));
    }

    #[test]
    fn test_assign_role_context_must_match() {
        let warden = warden();
        let context = warden.create_context(Some("team"), None).expect("context");
        let role = warden
            .create_role(NewRole::new("member").in_context(Some(context.id)))
            .expect("role");

        let err = warden
            .assign_role(&user("1"), &role, ContextInput::Global)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(warden.assign_role(&user("1"), &role, context.id).expect("assign"));
        assert_eq!(
            warden.role_names(&user("1"), context.id).expect("names"),
            vec!["member"]
        );
    }

    #[test]
    fn test_disallowed_subject_type() {
        let config = WardenConfig::default().with_allowed_subjects(["user"]);
        let warden = Warden::in_memory(config).expect("Failed to create warden");
        warden.create_permission(NewPermission::new("read")).expect("create");

        let err = warden
            .assign_permission(&SubjectRef::new("robot", "1"), "read", ContextInput::Global)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_batch_outcome() {
        let warden = warden();
        warden.create_permission(NewPermission::new("read")).expect("create");
        warden.create_permission(NewPermission::new("write")).expect("create");
        warden
            .assign_permission(&user("1"), "write", ContextInput::Global)
            .expect("assign");

        let outcome = warden
            .assign_permissions(&user("1"), ["read", "missing", "write"], ContextInput::Global)
            .expect("batch");
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.unchanged.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].item, "missing");
        assert!(!outcome.is_complete());
    }

    #[test]
    fn test_revoke_all_permissions() {
        let warden = warden();
        let context = warden.create_context(Some("c"), None).expect("context");
        for name in ["a", "b"] {
            warden.create_permission(NewPermission::new(name)).expect("create");
            warden
                .assign_permission(&user("1"), name, ContextInput::Global)
                .expect("assign");
        }
        warden.assign_permission(&user("1"), "a", context.id).expect("assign");

        let removed = warden
            .revoke_all_permissions(&user("1"), ContextInput::Global)
            .expect("revoke");
        assert_eq!(removed.len(), 2);
        assert!(warden.can(&user("1"), "a", context.id).expect("can"));
    }

    #[test]
    fn test_child_role_by_name_uses_parent_context() {
        let warden = warden();
        let context = warden.create_context(Some("c"), None).expect("context");
        let parent = warden
            .create_role(NewRole::new("lead").in_context(Some(context.id)))
            .expect("role");
        warden.create_role(NewRole::new("member")).expect("global role");

        // 전역 "member" 는 parent 의 context 에 없다
        assert!(matches!(
            warden.assign_child_role(&parent, "member"),
            Err(Error::InvalidArgument(_))
        ));

        warden
            .create_role(NewRole::new("member").in_context(Some(context.id)))
            .expect("scoped role");
        assert!(warden.assign_child_role(&parent, "member").expect("assign"));
        assert!(warden.remove_child_role(&parent, "member").expect("remove"));
        assert!(!warden.remove_child_role(&parent, "unknown").expect("remove"));
    }

    #[test]
    fn test_subjects_with() {
        let warden = warden();
        warden.create_permission(NewPermission::new("read")).expect("create");
        let role = warden.create_role(NewRole::new("reader")).expect("role");
        warden.give_role_permission(&role, "read").expect("give");
        warden.assign_permission(&user("1"), "read", ContextInput::Global).expect("assign");
        warden.assign_role(&user("2"), &role, ContextInput::Global).expect("assign");

        assert_eq!(warden.subjects_with_permission("read").expect("subjects"), vec![user("1")]);
        assert_eq!(warden.subjects_with_role(&role).expect("subjects"), vec![user("2")]);
        assert!(warden.subjects_with_permission("missing").expect("subjects").is_empty());
    }

    #[test]
    fn test_acting_as_denied_and_allowed() {
        let warden = warden();
        warden.create_permission(NewPermission::new("read")).expect("create");

        let err = warden
            .acting_as(user("intruder"))
            .assign_permission(&user("1"), "read", ContextInput::Global)
            .unwrap_err();
        assert!(matches!(err, Error::AuthorizationDenied(_)));
        assert!(!warden.can(&user("1"), "read", ContextInput::Global).expect("can"));

        let open = Warden::builder()
            .store(warden.store().clone())
            .authorizer(Arc::new(AllowAll))
            .config(WardenConfig::default().with_cache(CacheSettings::disabled()))
            .build()
            .expect("build");
        assert!(open
            .acting_as(user("anyone"))
            .assign_permission(&user("1"), "read", ContextInput::Global)
            .expect("assign"));

        let history = open.events().history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].actor, Some(user("anyone")));
    }

    #[test]
    fn test_update_permission_rename() {
        let warden = warden();
        let mut permission = warden.create_permission(NewPermission::new("read")).expect("create");
        warden.assign_permission(&user("1"), "read", ContextInput::Global).expect("assign");

        permission.name = "view".to_string();
        let updated = warden.update_permission(&permission).expect("update");
        assert_eq!(updated.name, "view");
        assert!(warden.can(&user("1"), "view", ContextInput::Global).expect("can"));

        permission.name = "Bad Name".to_string();
        assert!(matches!(
            warden.update_permission(&permission),
            Err(Error::Validation { .. })
        ));
    }
}
