//! Entity types - Permission, Role, Context

use super::holder::EntityRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Typed IDs
// ============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// 권한 ID
    PermissionId,
    "permission"
);
entity_id!(
    /// 역할 ID
    RoleId,
    "role"
);
entity_id!(
    /// 컨텍스트 ID
    ContextId,
    "context"
);

// ============================================================================
// Permission
// ============================================================================

/// 권한 (이름은 전역 유일)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

/// 새 권한 생성 요청
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub config: Option<Value>,
    pub order: Option<f64>,
}

impl NewPermission {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }
}

// ============================================================================
// Role
// ============================================================================

/// 역할 (이름은 context 내에서 유일, context 없음도 하나의 범위)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ContextId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

/// 새 역할 생성 요청
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub context_id: Option<ContextId>,
    pub config: Option<Value>,
    pub order: Option<f64>,
}

impl NewRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn in_context(mut self, context_id: Option<ContextId>) -> Self {
        self.context_id = context_id;
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }
}

// ============================================================================
// Context
// ============================================================================

/// 권한/역할 범위 (소유 엔티티당 최대 1개)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: ContextId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<EntityRef>,
    pub created_at: String,
    pub updated_at: String,
}

impl Context {
    /// 소유자 기반 기본 이름 ("<type> <id>")
    pub fn default_name_for(owner: &EntityRef) -> String {
        format!("{} {}", owner.entity_type, owner.entity_id)
    }
}
