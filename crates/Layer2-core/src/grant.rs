//! Grant Store - 연결(association) 연산
//!
//! 보유자(subject 또는 role) 와 대상(권한 또는 역할) 사이의 연결을 다룬다.
//! - `attach` 는 멱등: 같은 (보유자, 대상, context) 가 있으면 false 를 반환하는 no-op
//! - `detach` 는 명시적 범위만 삭제 (`Exact(None)` 은 context 없는 행만)
//! - `sync` 는 범위 안의 행만 교체하고 다른 context 는 건드리지 않는다
//!
//! 역할 계층의 순환 검사와 삽입은 저장소의 한 쓰기 트랜잭션에서 일어난다
//! (`RbacStore::attach_child_role`). 같은 저장소를 공유하는 다른 인스턴스도
//! 순환을 만들 수 없다. 인스턴스 내부 lock 은 같은 프로세스의 계층 쓰기를
//! 먼저 줄 세울 뿐이다.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;
use warden_foundation::{
    ContextId, ContextScope, Error, GrantHolder, GrantKind, RbacStore, Result, Role, SyncDelta,
};

pub struct GrantStore {
    store: Arc<dyn RbacStore>,
    hierarchy_lock: Mutex<()>,
}

impl GrantStore {
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self {
            store,
            hierarchy_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RbacStore> {
        &self.store
    }

    // ========================================================================
    // Uniform operations
    // ========================================================================

    /// 새로 연결되었으면 true, 이미 있었으면 false
    pub fn attach(
        &self,
        kind: GrantKind,
        holder: &impl GrantHolder,
        target: i64,
        context_id: Option<ContextId>,
    ) -> Result<bool> {
        let owner = holder.owner_key();
        let attached = self.store.attach(kind, &owner, target, context_id)?;
        debug!(
            kind = kind.as_str(),
            owner = %owner,
            target,
            context_id = ?context_id,
            attached,
            "Grant attach"
        );
        Ok(attached)
    }

    /// target 이 None 이면 범위 내 전체
    pub fn detach(
        &self,
        kind: GrantKind,
        holder: &impl GrantHolder,
        target: Option<i64>,
        scope: ContextScope,
    ) -> Result<usize> {
        let owner = holder.owner_key();
        let removed = self.store.detach(kind, &owner, target, scope)?;
        debug!(
            kind = kind.as_str(),
            owner = %owner,
            target = ?target,
            scope = ?scope,
            removed,
            "Grant detach"
        );
        Ok(removed)
    }

    pub fn sync(
        &self,
        kind: GrantKind,
        holder: &impl GrantHolder,
        targets: &[i64],
        context_id: Option<ContextId>,
    ) -> Result<SyncDelta<i64>> {
        self.store
            .sync(kind, &holder.owner_key(), targets, context_id)
    }

    pub fn exists(
        &self,
        kind: GrantKind,
        holder: &impl GrantHolder,
        target: i64,
        scope: ContextScope,
    ) -> Result<bool> {
        self.store.exists(kind, &holder.owner_key(), target, scope)
    }

    pub fn list_ids(
        &self,
        kind: GrantKind,
        holder: &impl GrantHolder,
        scope: ContextScope,
    ) -> Result<Vec<i64>> {
        self.store.targets(kind, &holder.owner_key(), scope)
    }

    pub fn list_names(
        &self,
        kind: GrantKind,
        holder: &impl GrantHolder,
        scope: ContextScope,
    ) -> Result<Vec<String>> {
        self.store.target_names(kind, &holder.owner_key(), scope)
    }

    // ========================================================================
    // Role hierarchy
    // ========================================================================

    /// parent 가 child 의 권한을 상속하도록 연결
    ///
    /// - parent == child 면 `SelfReference`
    /// - context 가 다르면 `InvalidArgument` (권한은 역할의 context 에서만 판정된다)
    /// - child 가 이미 parent 에 도달하면 `CircularDependency`
    pub fn assign_child_role(&self, parent: &Role, child: &Role) -> Result<bool> {
        if parent.id == child.id {
            return Err(Error::SelfReference(parent.name.clone()));
        }
        if parent.context_id != child.context_id {
            return Err(Error::InvalidArgument(format!(
                "Role '{}' belongs to a different context than '{}'",
                child.name, parent.name
            )));
        }

        let _guard = self.hierarchy_lock.lock();
        let attached = self.store.attach_child_role(parent, child)?;
        debug!(
            parent = %parent.name,
            child = %child.name,
            attached,
            "Child role assigned"
        );
        Ok(attached)
    }

    pub fn remove_child_role(&self, parent: &Role, child: &Role) -> Result<bool> {
        let _guard = self.hierarchy_lock.lock();
        let removed = self.store.detach(
            GrantKind::Role,
            &parent.owner_key(),
            Some(child.id.0),
            ContextScope::Any,
        )?;
        Ok(removed > 0)
    }

    pub fn child_roles(&self, parent: &Role) -> Result<Vec<Role>> {
        self.store
            .roles_held(&parent.owner_key(), ContextScope::Any)
    }

    pub fn parent_roles(&self, child: &Role) -> Result<Vec<Role>> {
        let ids: Vec<_> = self
            .store
            .holders_of_role(child.id)?
            .iter()
            .filter_map(|holder| holder.role_id())
            .collect();
        self.store.roles_by_ids(&ids)
    }
}
