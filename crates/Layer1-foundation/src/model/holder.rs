//! Holders - 권한/역할을 보유하는 쪽 (subject, role)

use super::entity::{Role, RoleId};
use serde::{Deserialize, Serialize};

/// 역할이 보유자로 저장될 때 사용하는 예약 타입
pub const ROLE_OWNER_TYPE: &str = "warden.role";

/// 외부 주체 (user, service account ...)
///
/// 코어는 subject 를 생성/삭제하지 않고 (type, id) 만 참조한다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_type: String,
    pub subject_id: String,
}

impl SubjectRef {
    pub fn new(subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
        }
    }
}

impl std::fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.subject_id)
    }
}

/// Context 를 소유하는 임의의 엔티티
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// 연결(association) 테이블의 보유자 키
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerKey {
    pub owner_type: String,
    pub owner_id: String,
}

impl OwnerKey {
    pub fn new(owner_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: owner_id.into(),
        }
    }

    pub fn for_role(role: RoleId) -> Self {
        Self::new(ROLE_OWNER_TYPE, role.0.to_string())
    }

    pub fn is_role(&self) -> bool {
        self.owner_type == ROLE_OWNER_TYPE
    }

    /// 역할 보유자면 RoleId 반환
    pub fn role_id(&self) -> Option<RoleId> {
        if !self.is_role() {
            return None;
        }
        self.owner_id.parse().ok().map(RoleId)
    }

    /// subject 보유자면 SubjectRef 반환
    pub fn subject(&self) -> Option<SubjectRef> {
        if self.is_role() {
            return None;
        }
        Some(SubjectRef::new(&self.owner_type, &self.owner_id))
    }
}

impl std::fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.owner_type, self.owner_id)
    }
}

/// 권한/역할을 보유할 수 있는 타입
pub trait GrantHolder {
    fn owner_key(&self) -> OwnerKey;
}

impl GrantHolder for SubjectRef {
    fn owner_key(&self) -> OwnerKey {
        OwnerKey::new(&self.subject_type, &self.subject_id)
    }
}

impl GrantHolder for Role {
    fn owner_key(&self) -> OwnerKey {
        OwnerKey::for_role(self.id)
    }
}

impl GrantHolder for RoleId {
    fn owner_key(&self) -> OwnerKey {
        OwnerKey::for_role(*self)
    }
}

impl GrantHolder for OwnerKey {
    fn owner_key(&self) -> OwnerKey {
        self.clone()
    }
}

impl<T: GrantHolder + ?Sized> GrantHolder for &T {
    fn owner_key(&self) -> OwnerKey {
        (**self).owner_key()
    }
}
