//! warden-core: Role/Permission runtime for Warden
//!
//! Layer2 - 권한 판정과 관리 레이어
//!
//! # 주요 모듈
//!
//! - `manager`: Warden facade (생성, 부여, 회수, 동기화, 조회)
//! - `engine`: 권한 판정 (직접 권한 + 역할 + 역할 계층, 캐시)
//! - `grant`: 연결 연산과 역할 계층 쓰기
//! - `hierarchy`: 역할 계층 그래프 (확장, 순환 검사)
//! - `context`: context 입력 해석
//! - `validator`: 이름/config 검증
//! - `policy`: subject 타입 allow-list
//! - `authorize`: actor 관리 권한 확인
//!
//! # 사용 예시
//!
//! ```ignore
//! use warden_core::{ContextInput, Warden};
//! use warden_foundation::{EntityRef, NewPermission, NewRole, SubjectRef, WardenConfig};
//!
//! let warden = Warden::open(WardenConfig::load()?)?;
//!
//! warden.create_permission(NewPermission::new("posts.edit"))?;
//! let editor = warden.create_role(NewRole::new("editor"))?;
//! warden.give_role_permission(&editor, "posts.edit")?;
//!
//! let alice = SubjectRef::new("user", "alice");
//! warden.assign_role(&alice, &editor, ContextInput::Global)?;
//! assert!(warden.can(&alice, "posts.edit", ContextInput::Global)?);
//!
//! // 팀 단위 context
//! let team = warden.context_for(&EntityRef::new("team", "7"))?;
//! warden.assign_permission(&alice, "posts.edit", team.id)?;
//!
//! // 관리 권한 확인 후 변경
//! warden
//!     .acting_as(alice.clone())
//!     .revoke_permission(&alice, "posts.edit", team.id)?;
//! ```

pub mod authorize;
pub mod context;
pub mod engine;
pub mod grant;
pub mod hierarchy;
pub mod manager;
pub mod policy;
pub mod validator;

// Re-exports: Facade
pub use manager::{
    ActingWarden, BatchOutcome, PermissionRef, RoleRef, SkippedItem, Warden, WardenBuilder,
};

// Re-exports: Resolution
pub use context::{ContextInput, ContextResolver};
pub use engine::PermissionEngine;
pub use hierarchy::{HierarchyResolver, RoleGraph};

// Re-exports: Grants
pub use grant::GrantStore;

// Re-exports: Validation / Policy
pub use authorize::{AllowAll, Authorizer, PolicyAuthorizer};
pub use policy::SubjectPolicy;
pub use validator::{
    sanitize_name, validate_config, validate_name, validate_optional_config,
    validate_permission_name, validate_role_name, ConfigSchema, FieldSchema, FieldType, NameKind,
};
