//! Audit Types - 감사 로그 데이터 구조

use crate::event::{GrantEvent, GrantEventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

// ============================================================================
// Audit ID
// ============================================================================

/// 감사 로그 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditId(pub String);

impl AuditId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Audit Record
// ============================================================================

/// 감사 기록 한 건
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditId,
    pub timestamp: DateTime<Utc>,

    /// 이벤트 이름 (예: "permission.assigned")
    pub event: String,

    /// 변경을 수행한 주체 ("type:id")
    pub actor: Option<String>,

    /// 변경된 대상 (보유자 또는 엔티티)
    pub subject: Option<String>,

    pub old_values: Value,
    pub new_values: Value,
    pub metadata: Value,
}

impl AuditRecord {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            id: AuditId::new(),
            timestamp: Utc::now(),
            event: event.into(),
            actor: None,
            subject: None,
            old_values: Value::Null,
            new_values: Value::Null,
            metadata: Value::Null,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_old_values(mut self, values: Value) -> Self {
        self.old_values = values;
        self
    }

    pub fn with_new_values(mut self, values: Value) -> Self {
        self.new_values = values;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// 이벤트를 감사 기록으로 변환
    pub fn from_event(event: &GrantEvent) -> Self {
        let (subject, old_values, new_values) = describe(&event.kind);

        let mut record = Self::new(event.name());
        record.timestamp = event.timestamp;
        record.actor = event.actor.as_ref().map(|a| a.to_string());
        record.subject = Some(subject);
        record.old_values = old_values;
        record.new_values = new_values;
        if !event.metadata.is_empty() {
            record.metadata = Value::Object(
                event
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            );
        }
        record
    }

    /// 키별 변경 내역 ({key: {from, to}}), 값이 같은 키는 제외
    pub fn changes(&self) -> Map<String, Value> {
        let empty = Map::new();
        let old = self.old_values.as_object().unwrap_or(&empty);
        let new = self.new_values.as_object().unwrap_or(&empty);

        let mut keys: Vec<&String> = old.keys().chain(new.keys()).collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .filter_map(|key| {
                let from = old.get(key).cloned().unwrap_or(Value::Null);
                let to = new.get(key).cloned().unwrap_or(Value::Null);
                (from != to).then(|| (key.clone(), json!({ "from": from, "to": to })))
            })
            .collect()
    }
}

/// (subject, old_values, new_values)
fn describe(kind: &GrantEventKind) -> (String, Value, Value) {
    use GrantEventKind::*;

    match kind {
        PermissionAssigned { holder, permission_id, permission, context_id } => (
            holder.to_string(),
            Value::Null,
            json!({ "permission": permission, "permission_id": permission_id, "context_id": context_id }),
        ),
        PermissionRemoved { holder, permission_id, permission, context_id } => (
            holder.to_string(),
            json!({ "permission": permission, "permission_id": permission_id, "context_id": context_id }),
            Value::Null,
        ),
        PermissionsSynced { holder, attached, detached, context_id } => (
            holder.to_string(),
            json!({ "detached": detached, "context_id": context_id }),
            json!({ "attached": attached, "context_id": context_id }),
        ),
        PermissionsAssignedBatch { holder, permission_ids, context_id } => (
            holder.to_string(),
            Value::Null,
            json!({ "permission_ids": permission_ids, "context_id": context_id }),
        ),
        PermissionsRemovedBatch { holder, permission_ids, context_id } => (
            holder.to_string(),
            json!({ "permission_ids": permission_ids, "context_id": context_id }),
            Value::Null,
        ),
        RoleAssigned { holder, role_id, role, context_id } => (
            holder.to_string(),
            Value::Null,
            json!({ "role": role, "role_id": role_id, "context_id": context_id }),
        ),
        RoleRemoved { holder, role_id, role, context_id } => (
            holder.to_string(),
            json!({ "role": role, "role_id": role_id, "context_id": context_id }),
            Value::Null,
        ),
        RolesSynced { holder, attached, detached, context_id } => (
            holder.to_string(),
            json!({ "detached": detached, "context_id": context_id }),
            json!({ "attached": attached, "context_id": context_id }),
        ),
        RolesAssignedBatch { holder, role_ids, context_id } => (
            holder.to_string(),
            Value::Null,
            json!({ "role_ids": role_ids, "context_id": context_id }),
        ),
        RolesRemovedBatch { holder, role_ids, context_id } => (
            holder.to_string(),
            json!({ "role_ids": role_ids, "context_id": context_id }),
            Value::Null,
        ),
        RoleChildAssigned { parent_id, parent, child_id, child } => (
            parent_id.to_string(),
            Value::Null,
            json!({ "parent": parent, "child": child, "child_id": child_id }),
        ),
        RoleChildRemoved { parent_id, parent, child_id, child } => (
            parent_id.to_string(),
            json!({ "parent": parent, "child": child, "child_id": child_id }),
            Value::Null,
        ),
        ContextCreated { context_id, name, owner } => (
            context_id.to_string(),
            Value::Null,
            json!({ "name": name, "owner": owner.as_ref().map(|o| o.to_string()) }),
        ),
        ContextDeleted { context_id, name, owner } => (
            context_id.to_string(),
            json!({ "name": name, "owner": owner.as_ref().map(|o| o.to_string()) }),
            Value::Null,
        ),
        PermissionCreated { permission_id, name } => {
            (permission_id.to_string(), Value::Null, json!({ "name": name }))
        }
        PermissionUpdated { permission_id, old_name, name } => (
            permission_id.to_string(),
            json!({ "name": old_name }),
            json!({ "name": name }),
        ),
        PermissionDeleted { permission_id, name } => {
            (permission_id.to_string(), json!({ "name": name }), Value::Null)
        }
        RoleCreated { role_id, name, context_id } => (
            role_id.to_string(),
            Value::Null,
            json!({ "name": name, "context_id": context_id }),
        ),
        RoleUpdated { role_id, old_name, name, context_id } => (
            role_id.to_string(),
            json!({ "name": old_name, "context_id": context_id }),
            json!({ "name": name, "context_id": context_id }),
        ),
        RoleDeleted { role_id, name, context_id } => (
            role_id.to_string(),
            json!({ "name": name, "context_id": context_id }),
            Value::Null,
        ),
    }
}

// ============================================================================
// Audit Query
// ============================================================================

/// 감사 로그 조회 조건
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub events: Option<Vec<String>>,
    pub actor: Option<String>,
    pub subject: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = Some(events.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

// ============================================================================
// Audit Statistics
// ============================================================================

/// 감사 로그 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total_entries: u64,
    pub by_event: HashMap<String, u64>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}
