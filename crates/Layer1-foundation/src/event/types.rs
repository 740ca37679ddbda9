//! Event Types - 권한 변경 이벤트 정의
//!
//! 모든 변경 연산은 실제로 상태가 바뀌었을 때 하나의 `GrantEvent` 를 발행한다.

use crate::model::{ContextId, EntityRef, OwnerKey, PermissionId, RoleId, SubjectRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Event ID
// ============================================================================

/// 이벤트 고유 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// 새 이벤트 ID 생성
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event Category
// ============================================================================

/// 이벤트 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// 권한 부여/회수/동기화
    Permission,
    /// 역할 부여/회수/동기화
    Role,
    /// 역할 계층 변경
    Hierarchy,
    /// 컨텍스트 생성/삭제
    Context,
    /// 권한/역할 엔티티 생성/수정/삭제
    Entity,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Role => "role",
            Self::Hierarchy => "hierarchy",
            Self::Context => "context",
            Self::Entity => "entity",
        }
    }
}

// ============================================================================
// Event Kind
// ============================================================================

/// 이벤트 종류별 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GrantEventKind {
    // 권한 연결
    PermissionAssigned {
        holder: OwnerKey,
        permission_id: PermissionId,
        permission: String,
        context_id: Option<ContextId>,
    },
    PermissionRemoved {
        holder: OwnerKey,
        permission_id: PermissionId,
        permission: String,
        context_id: Option<ContextId>,
    },
    PermissionsSynced {
        holder: OwnerKey,
        attached: Vec<PermissionId>,
        detached: Vec<PermissionId>,
        context_id: Option<ContextId>,
    },
    PermissionsAssignedBatch {
        holder: OwnerKey,
        permission_ids: Vec<PermissionId>,
        context_id: Option<ContextId>,
    },
    PermissionsRemovedBatch {
        holder: OwnerKey,
        permission_ids: Vec<PermissionId>,
        context_id: Option<ContextId>,
    },

    // 역할 연결
    RoleAssigned {
        holder: OwnerKey,
        role_id: RoleId,
        role: String,
        context_id: Option<ContextId>,
    },
    RoleRemoved {
        holder: OwnerKey,
        role_id: RoleId,
        role: String,
        context_id: Option<ContextId>,
    },
    RolesSynced {
        holder: OwnerKey,
        attached: Vec<RoleId>,
        detached: Vec<RoleId>,
        context_id: Option<ContextId>,
    },
    RolesAssignedBatch {
        holder: OwnerKey,
        role_ids: Vec<RoleId>,
        context_id: Option<ContextId>,
    },
    RolesRemovedBatch {
        holder: OwnerKey,
        role_ids: Vec<RoleId>,
        context_id: Option<ContextId>,
    },

    // 역할 계층
    RoleChildAssigned {
        parent_id: RoleId,
        parent: String,
        child_id: RoleId,
        child: String,
    },
    RoleChildRemoved {
        parent_id: RoleId,
        parent: String,
        child_id: RoleId,
        child: String,
    },

    // 컨텍스트
    ContextCreated {
        context_id: ContextId,
        name: Option<String>,
        owner: Option<EntityRef>,
    },
    ContextDeleted {
        context_id: ContextId,
        name: Option<String>,
        owner: Option<EntityRef>,
    },

    // 엔티티
    PermissionCreated {
        permission_id: PermissionId,
        name: String,
    },
    PermissionUpdated {
        permission_id: PermissionId,
        old_name: String,
        name: String,
    },
    PermissionDeleted {
        permission_id: PermissionId,
        name: String,
    },
    RoleCreated {
        role_id: RoleId,
        name: String,
        context_id: Option<ContextId>,
    },
    RoleUpdated {
        role_id: RoleId,
        old_name: String,
        name: String,
        context_id: Option<ContextId>,
    },
    RoleDeleted {
        role_id: RoleId,
        name: String,
        context_id: Option<ContextId>,
    },
}

impl GrantEventKind {
    /// 이벤트 이름 (감사 로그 / 필터용)
    pub fn name(&self) -> &'static str {
        match self {
            Self::PermissionAssigned { .. } => "permission.assigned",
            Self::PermissionRemoved { .. } => "permission.removed",
            Self::PermissionsSynced { .. } => "permissions.synced",
            Self::PermissionsAssignedBatch { .. } => "permissions.assigned_batch",
            Self::PermissionsRemovedBatch { .. } => "permissions.removed_batch",
            Self::RoleAssigned { .. } => "role.assigned",
            Self::RoleRemoved { .. } => "role.removed",
            Self::RolesSynced { .. } => "roles.synced",
            Self::RolesAssignedBatch { .. } => "roles.assigned_batch",
            Self::RolesRemovedBatch { .. } => "roles.removed_batch",
            Self::RoleChildAssigned { .. } => "role.child_assigned",
            Self::RoleChildRemoved { .. } => "role.child_removed",
            Self::ContextCreated { .. } => "context.created",
            Self::ContextDeleted { .. } => "context.deleted",
            Self::PermissionCreated { .. } => "permission.created",
            Self::PermissionUpdated { .. } => "permission.updated",
            Self::PermissionDeleted { .. } => "permission.deleted",
            Self::RoleCreated { .. } => "role.created",
            Self::RoleUpdated { .. } => "role.updated",
            Self::RoleDeleted { .. } => "role.deleted",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Self::PermissionAssigned { .. }
            | Self::PermissionRemoved { .. }
            | Self::PermissionsSynced { .. }
            | Self::PermissionsAssignedBatch { .. }
            | Self::PermissionsRemovedBatch { .. } => EventCategory::Permission,
            Self::RoleAssigned { .. }
            | Self::RoleRemoved { .. }
            | Self::RolesSynced { .. }
            | Self::RolesAssignedBatch { .. }
            | Self::RolesRemovedBatch { .. } => EventCategory::Role,
            Self::RoleChildAssigned { .. } | Self::RoleChildRemoved { .. } => {
                EventCategory::Hierarchy
            }
            Self::ContextCreated { .. } | Self::ContextDeleted { .. } => EventCategory::Context,
            Self::PermissionCreated { .. }
            | Self::PermissionUpdated { .. }
            | Self::PermissionDeleted { .. }
            | Self::RoleCreated { .. }
            | Self::RoleUpdated { .. }
            | Self::RoleDeleted { .. } => EventCategory::Entity,
        }
    }

    /// 변경 대상 보유자 (연결 이벤트만)
    pub fn holder(&self) -> Option<&OwnerKey> {
        match self {
            Self::PermissionAssigned { holder, .. }
            | Self::PermissionRemoved { holder, .. }
            | Self::PermissionsSynced { holder, .. }
            | Self::PermissionsAssignedBatch { holder, .. }
            | Self::PermissionsRemovedBatch { holder, .. }
            | Self::RoleAssigned { holder, .. }
            | Self::RoleRemoved { holder, .. }
            | Self::RolesSynced { holder, .. }
            | Self::RolesAssignedBatch { holder, .. }
            | Self::RolesRemovedBatch { holder, .. } => Some(holder),
            _ => None,
        }
    }

    pub fn context_id(&self) -> Option<ContextId> {
        match self {
            Self::PermissionAssigned { context_id, .. }
            | Self::PermissionRemoved { context_id, .. }
            | Self::PermissionsSynced { context_id, .. }
            | Self::PermissionsAssignedBatch { context_id, .. }
            | Self::PermissionsRemovedBatch { context_id, .. }
            | Self::RoleAssigned { context_id, .. }
            | Self::RoleRemoved { context_id, .. }
            | Self::RolesSynced { context_id, .. }
            | Self::RolesAssignedBatch { context_id, .. }
            | Self::RolesRemovedBatch { context_id, .. }
            | Self::RoleCreated { context_id, .. }
            | Self::RoleUpdated { context_id, .. }
            | Self::RoleDeleted { context_id, .. } => *context_id,
            Self::ContextCreated { context_id, .. } | Self::ContextDeleted { context_id, .. } => {
                Some(*context_id)
            }
            _ => None,
        }
    }
}

// ============================================================================
// GrantEvent
// ============================================================================

/// 권한 변경 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,

    /// 변경을 수행한 주체 (시스템 작업이면 None)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<SubjectRef>,

    #[serde(flatten)]
    pub kind: GrantEventKind,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl GrantEvent {
    pub fn new(kind: GrantEventKind) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            actor: None,
            kind,
            metadata: HashMap::new(),
        }
    }

    pub fn with_actor(mut self, actor: Option<SubjectRef>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn category(&self) -> EventCategory {
        self.kind.category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_and_category() {
        let event = GrantEvent::new(GrantEventKind::PermissionsSynced {
            holder: OwnerKey::new("user", "1"),
            attached: vec![PermissionId(1)],
            detached: vec![],
            context_id: Some(ContextId(4)),
        });

        assert_eq!(event.name(), "permissions.synced");
        assert_eq!(event.category(), EventCategory::Permission);
        assert_eq!(event.kind.context_id(), Some(ContextId(4)));
        assert_eq!(event.kind.holder(), Some(&OwnerKey::new("user", "1")));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = GrantEvent::new(GrantEventKind::RoleChildAssigned {
            parent_id: RoleId(1),
            parent: "senior-editor".into(),
            child_id: RoleId(2),
            child: "editor".into(),
        })
        .with_actor(Some(SubjectRef::new("user", "admin")))
        .with_metadata("ip", "127.0.0.1");

        let json = serde_json::to_value(&event).expect("Failed to serialize");
        assert_eq!(json["event"], "role_child_assigned");
        assert_eq!(json["parent"], "senior-editor");
        assert_eq!(json["actor"]["subject_id"], "admin");
        assert_eq!(json["metadata"]["ip"], "127.0.0.1");
        assert_eq!(event.category(), EventCategory::Hierarchy);
        assert_eq!(event.kind.holder(), None);
    }
}
