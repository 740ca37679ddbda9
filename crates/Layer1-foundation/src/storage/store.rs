//! RbacStore - 영속성 경계
//!
//! 엔진은 이 trait 만 사용한다. 연결(association) 연산은 `GrantKind` 로
//! 테이블을 고르고 `OwnerKey` 로 보유자(subject 또는 role)를 지정한다.

use crate::model::{
    Context, ContextId, ContextScope, EntityRef, GrantKind, NewPermission, NewRole, OwnerKey,
    Permission, PermissionId, Role, RoleId, SyncDelta,
};
use crate::Result;

/// 권한 데이터 저장소
pub trait RbacStore: Send + Sync {
    // ========================================================================
    // Permissions
    // ========================================================================

    /// 이름 중복이면 `AlreadyExists`
    fn insert_permission(&self, new: &NewPermission) -> Result<Permission>;

    fn permission(&self, id: PermissionId) -> Result<Option<Permission>>;

    fn permission_by_name(&self, name: &str) -> Result<Option<Permission>>;

    /// order, id 순
    fn permissions(&self) -> Result<Vec<Permission>>;

    /// name/config/order 갱신 (updated_at 자동 갱신)
    fn update_permission(&self, permission: &Permission) -> Result<Permission>;

    /// 연결된 모든 행도 함께 삭제
    fn delete_permission(&self, id: PermissionId) -> Result<bool>;

    // ========================================================================
    // Roles
    // ========================================================================

    /// (name, context) 중복이면 `AlreadyExists`
    fn insert_role(&self, new: &NewRole) -> Result<Role>;

    fn role(&self, id: RoleId) -> Result<Option<Role>>;

    /// context 는 정확히 일치해야 한다 (None 은 context 없는 역할만)
    fn role_by_name(&self, name: &str, context_id: Option<ContextId>) -> Result<Option<Role>>;

    fn roles(&self, scope: ContextScope) -> Result<Vec<Role>>;

    fn roles_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>>;

    fn update_role(&self, role: &Role) -> Result<Role>;

    /// 역할이 보유한 권한/자식 역할, 역할을 보유한 연결 모두 삭제
    fn delete_role(&self, id: RoleId) -> Result<bool>;

    // ========================================================================
    // Contexts
    // ========================================================================

    /// 소유자가 이미 context 를 가지면 `AlreadyExists`
    fn insert_context(&self, name: Option<&str>, owner: Option<&EntityRef>) -> Result<Context>;

    fn context(&self, id: ContextId) -> Result<Option<Context>>;

    fn context_by_owner(&self, owner: &EntityRef) -> Result<Option<Context>>;

    fn contexts(&self) -> Result<Vec<Context>>;

    /// 해당 context 의 역할과 context 범위 연결 모두 삭제
    fn delete_context(&self, id: ContextId) -> Result<bool>;

    // ========================================================================
    // Associations
    // ========================================================================

    /// 이미 존재하면 false (no-op). Role 연결은 context_id 를 무시한다.
    fn attach(
        &self,
        kind: GrantKind,
        owner: &OwnerKey,
        target: i64,
        context_id: Option<ContextId>,
    ) -> Result<bool>;

    /// target 이 None 이면 범위 내 전체 삭제, 삭제된 행 수 반환
    fn detach(
        &self,
        kind: GrantKind,
        owner: &OwnerKey,
        target: Option<i64>,
        scope: ContextScope,
    ) -> Result<usize>;

    fn exists(
        &self,
        kind: GrantKind,
        owner: &OwnerKey,
        target: i64,
        scope: ContextScope,
    ) -> Result<bool>;

    /// 범위 내 연결 대상 ID
    fn targets(&self, kind: GrantKind, owner: &OwnerKey, scope: ContextScope) -> Result<Vec<i64>>;

    /// 범위 내 연결 대상 이름
    fn target_names(
        &self,
        kind: GrantKind,
        owner: &OwnerKey,
        scope: ContextScope,
    ) -> Result<Vec<String>>;

    /// 하나의 트랜잭션에서 범위 내 연결을 desired 로 교체
    fn sync(
        &self,
        kind: GrantKind,
        owner: &OwnerKey,
        desired: &[i64],
        context_id: Option<ContextId>,
    ) -> Result<SyncDelta<i64>>;

    /// 역할 계층 간선 (parent → child) 추가
    ///
    /// 도달성 검사와 삽입이 하나의 쓰기 트랜잭션 안에서 일어나야 한다.
    /// 같은 저장소를 여러 인스턴스/프로세스가 공유해도 순환이 생기지 않는다.
    /// - parent == child 면 `SelfReference`
    /// - child 가 이미 parent 에 도달하면 `CircularDependency`
    /// - 이미 있는 간선이면 false
    fn attach_child_role(&self, parent: &Role, child: &Role) -> Result<bool>;

    // ========================================================================
    // Resolution helpers
    // ========================================================================

    /// 역할 계층 간선 (parent, child) 전체
    fn role_edges(&self) -> Result<Vec<(RoleId, RoleId)>>;

    /// 여러 보유자가 범위 내에서 가진 권한 (중복 제거)
    fn permissions_held(&self, owners: &[OwnerKey], scope: ContextScope) -> Result<Vec<Permission>>;

    /// 보유자가 직접 가진 역할 (역할의 context 로 필터)
    fn roles_held(&self, owner: &OwnerKey, scope: ContextScope) -> Result<Vec<Role>>;

    /// 해당 권한을 (어떤 범위로든) 가진 보유자
    fn holders_of_permission(&self, id: PermissionId) -> Result<Vec<OwnerKey>>;

    /// 해당 역할을 가진 보유자 (subject 와 부모 역할)
    fn holders_of_role(&self, id: RoleId) -> Result<Vec<OwnerKey>>;
}
